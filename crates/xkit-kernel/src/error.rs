//! Errors raised while bootstrapping the kernel.

use thiserror::Error;

use xkit_core::error::ConfigError;
use xkit_plugins::error::PluginError;

/// Failures that can prevent the kernel from starting.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The runtime configuration file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin root could not be scanned, or a manifest there was
    /// malformed.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Result alias for kernel bootstrap.
pub type BootstrapResult<T> = Result<T, BootstrapError>;
