//! Plugin manager error types.

use thiserror::Error;

use xkit_core::ids::{CommandName, PluginName};

/// Errors raised by plugin discovery, loading, and dispatch.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A manifest file could not be read or parsed.
    #[error("failed to parse manifest at {path}: {message}")]
    ManifestParse {
        /// Path to the invalid manifest.
        path: String,
        /// The underlying parse error.
        message: String,
    },

    /// No factory is registered for the manifest's entry point.
    #[error("no factory registered for entry point {0:?}")]
    UnknownEntryPoint(String),

    /// A plugin with this name is already loaded.
    #[error("plugin {0} is already loaded")]
    AlreadyLoaded(PluginName),

    /// No plugin with this name is loaded.
    #[error("plugin {0} is not loaded")]
    NotLoaded(PluginName),

    /// No loaded plugin declares this command.
    #[error("no loaded plugin declares command {0}")]
    UnknownCommand(CommandName),

    /// A plugin's `requires` dependency is not loaded.
    #[error("plugin {plugin} requires {dependency}, which is not loaded")]
    MissingDependency {
        /// The dependent plugin.
        plugin: PluginName,
        /// The unmet dependency.
        dependency: PluginName,
    },

    /// Two plugins declared the same command.
    #[error("command {command} is already provided by plugin {existing}")]
    CommandConflict {
        /// The command in conflict.
        command: CommandName,
        /// The plugin that already owns it.
        existing: PluginName,
    },

    /// The plugin's `init`, `shutdown`, or state transfer hook failed.
    #[error("plugin {plugin} failed during {phase}: {message}")]
    LifecycleFailed {
        /// The plugin involved.
        plugin: PluginName,
        /// Which lifecycle phase failed (`init`, `shutdown`, `export_state`, `import_state`).
        phase: &'static str,
        /// The failure message (an `Err` return or a caught panic).
        message: String,
    },
}

/// Result alias for plugin manager operations.
pub type PluginResult<T> = Result<T, PluginError>;
