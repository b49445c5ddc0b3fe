//! Shared low-level error types.

use thiserror::Error;

/// Errors raised by port adapters (process spawn, filesystem, HTTP).
#[derive(Debug, Error)]
pub enum PortError {
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP transport returned a non-success status or a transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The underlying process is no longer running.
    #[error("process exited")]
    ProcessExited,
}

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration at {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file's TOML was malformed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Neither `$XKIT_HOME` nor `$HOME` could be resolved.
    #[error("cannot determine xkit home directory: {0}")]
    HomeUnresolved(String),
}

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
