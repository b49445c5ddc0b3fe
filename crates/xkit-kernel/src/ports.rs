//! The bundle of adapters bound to the core's ports at startup.

use std::sync::Arc;

use xkit_core::adapters::{
    ReqwestHttpPort, StaticConfigPort, StdFilesystem, SystemClock, TokioProcessPort, TracingLogger,
};
use xkit_core::config::RuntimeConfig;
use xkit_core::ports::{ClockPort, ConfigPort, FilesystemPort, HttpPort, LoggerPort, ProcessPort};

/// One adapter per port, bound once at startup. Nothing past this struct
/// ever matches on a concrete adapter type.
#[derive(Clone)]
pub struct KernelPorts {
    /// Dotted-key read-only configuration view.
    pub config: Arc<dyn ConfigPort>,
    /// Structured logging sink.
    pub logger: Arc<dyn LoggerPort>,
    /// Wall-clock access.
    pub clock: Arc<dyn ClockPort>,
    /// Child-process spawning, used by the MCP child-process transport.
    pub process: Arc<dyn ProcessPort>,
    /// HTTP request/response and streaming, used by the MCP HTTP transport.
    pub http: Arc<dyn HttpPort>,
    /// Plugin manifest and configuration file access.
    pub filesystem: Arc<dyn FilesystemPort>,
}

impl KernelPorts {
    /// Bind the default system adapters (`tracing`, the system clock,
    /// `tokio::process`, `reqwest`, and `std::fs`).
    #[must_use]
    pub fn system(config: &RuntimeConfig) -> Self {
        Self {
            config: Arc::new(StaticConfigPort::from_config(config)),
            logger: Arc::new(TracingLogger),
            clock: Arc::new(SystemClock),
            process: Arc::new(TokioProcessPort),
            http: Arc::new(ReqwestHttpPort::default()),
            filesystem: Arc::new(StdFilesystem),
        }
    }
}
