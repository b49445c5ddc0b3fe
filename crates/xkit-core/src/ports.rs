//! Hexagonal ports: the abstract capabilities the kernel consumes.
//!
//! Each port is a narrow trait. Adapters are bound once at startup by the
//! kernel; nothing in the core ever matches on a concrete adapter type.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::PortError;

/// Read-only view over the runtime's configuration tree.
pub trait ConfigPort: Send + Sync {
    /// Look up a dotted configuration key (e.g. `"event_bus.replay_buffer_size"`).
    fn get(&self, key: &str) -> Option<Value>;
}

/// Structured logging sink consumed by the core.
///
/// The default adapter forwards to `tracing`; a test adapter records events
/// in memory so tests can assert on what was logged without a global
/// subscriber.
pub trait LoggerPort: Send + Sync {
    /// Emit a structured log line at the given level.
    fn log(&self, level: LogLevel, target: &str, message: &str, fields: &[(&str, &str)]);
}

/// Logging severity, mirroring `tracing::Level` without depending on it in
/// the trait signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Diagnostic detail useful during development.
    Debug,
    /// Normal operational messages.
    Info,
    /// Recoverable but noteworthy conditions.
    Warn,
    /// Failures requiring attention.
    Error,
}

/// Wall-clock access, abstracted so tests can inject a controllable clock.
#[async_trait]
pub trait ClockPort: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// A request to spawn a child process with piped stdio.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Environment variables to set (merged over the parent's environment).
    pub env: HashMap<String, String>,
    /// Working directory; `None` inherits the parent's.
    pub cwd: Option<PathBuf>,
}

/// A spawned child process with piped stdio, abstracted over the concrete
/// async process handle.
#[async_trait]
pub trait ChildProcess: Send + Sync {
    /// Write a line (without trailing newline) to the child's stdin.
    async fn write_line(&mut self, line: &str) -> Result<(), PortError>;

    /// Read the next complete line from the child's stdout, or `None` on EOF.
    async fn read_line(&mut self) -> Result<Option<String>, PortError>;

    /// Terminate the child process.
    async fn kill(&mut self) -> Result<(), PortError>;
}

/// Capability to spawn child processes with piped stdio, used by the
/// child-process MCP transport.
#[async_trait]
pub trait ProcessPort: Send + Sync {
    /// Spawn a child process per `spec`.
    async fn spawn(&self, spec: ProcessSpec) -> Result<Box<dyn ChildProcess>, PortError>;
}

/// A minimal HTTP request, sufficient for the HTTP MCP transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

/// A minimal HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// HTTP request/response plus a streaming (SSE-like) read, used by the HTTP
/// MCP transport.
#[async_trait]
pub trait HttpPort: Send + Sync {
    /// Perform a single POST request with a JSON body, returning the JSON
    /// response.
    async fn post_json(&self, request: HttpRequest) -> Result<HttpResponse, PortError>;

    /// Open a streaming GET, returning a channel that yields one JSON value
    /// per server-sent event.
    async fn stream_events(
        &self,
        url: &str,
        headers: HashMap<String, String>,
    ) -> Result<tokio::sync::mpsc::Receiver<Value>, PortError>;
}

/// Filesystem access used to read plugin manifests and configuration.
pub trait FilesystemPort: Send + Sync {
    /// Read an entire file to a string.
    fn read_to_string(&self, path: &Path) -> Result<String, PortError>;

    /// List the entries of a directory (non-recursive).
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, PortError>;

    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;
}
