//! Logging setup: configures a `tracing` subscriber for the runtime process.

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Errors raised while installing the global `tracing` subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed (e.g. by a test harness).
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobal(String),
}

/// Result alias for logging setup.
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line, for local development.
    #[default]
    Pretty,
    /// Single-line compact format.
    Compact,
    /// Newline-delimited JSON, for log aggregation.
    Json,
}

/// Logging configuration, built from [`crate::config::LoggingConfig`] or
/// directly by callers (e.g. the CLI) that want to override it.
#[derive(Debug, Clone)]
pub struct LogConfig {
    level: String,
    format: LogFormat,
    extra_directives: Vec<String>,
}

impl LogConfig {
    /// Start from a base level (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            extra_directives: Vec::new(),
        }
    }

    /// Select the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Add an additional `tracing_subscriber::EnvFilter` directive, e.g.
    /// `"xkit_mcp=trace"`.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(&self.level);
        for directive in &self.extra_directives {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }
        filter
    }
}

/// Install a global `tracing` subscriber built from `config`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> LoggingResult<()> {
    let filter = config.env_filter();
    let result = match config.format {
        LogFormat::Pretty => fmt().with_env_filter(filter).pretty().try_init(),
        LogFormat::Compact => fmt().with_env_filter(filter).compact().try_init(),
        LogFormat::Json => fmt().with_env_filter(filter).json().try_init(),
    };
    result.map_err(|e| LoggingError::SetGlobal(e.to_string()))
}

/// Install a subscriber using sane defaults (`info`, pretty), ignoring the
/// error if one is already installed — convenient for `#[tokio::test]`
/// harnesses that call this from many tests.
pub fn setup_default_logging() {
    let _ = setup_logging(&LogConfig::new("info"));
}
