//! Convenience re-exports for downstream crates.

pub use crate::adapters::StaticConfigPort;
pub use crate::config::RuntimeConfig;
pub use crate::dirs::XkitHome;
pub use crate::error::{ConfigError, ConfigResult, PortError};
pub use crate::ids::{
    CommandName, CorrelationId, EventTypeName, PluginName, ServerName, SubscriptionId, ToolName,
};
pub use crate::logging::{LogConfig, LogFormat, setup_default_logging, setup_logging};
pub use crate::outcome::{DispatchResult, HandlerOutcome};
pub use crate::ports::{
    ChildProcess, ClockPort, ConfigPort, FilesystemPort, HttpPort, HttpRequest, HttpResponse,
    LogLevel, LoggerPort, ProcessPort, ProcessSpec,
};
