//! The runtime's configuration tree, read by the kernel at startup.
//!
//! Loaded from a single `xkit.toml`, following `astrid-mcp::config`'s
//! `ServersConfig`/`ServerConfig` shape for the server table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// One entry of the `[servers.<name>]` table: an MCP transport descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServerDescriptorConfig {
    /// Spawn a child process speaking MCP over line-delimited stdio.
    ChildProcess {
        /// Executable to run.
        command: String,
        /// Arguments passed to the executable.
        #[serde(default)]
        args: Vec<String>,
        /// Environment variables to set.
        #[serde(default)]
        env: HashMap<String, String>,
        /// Working directory; inherits the parent's if unset.
        cwd: Option<PathBuf>,
        /// Restart behavior on unexpected exit.
        #[serde(default)]
        restart: RestartConfig,
    },
    /// Speak MCP over HTTP, with a streaming endpoint for server-initiated
    /// notifications.
    Http {
        /// Base URL of the server.
        base_url: String,
        /// Optional bearer token authentication.
        auth: Option<HttpAuthConfig>,
        /// Path of the streaming (SSE-like) endpoint, relative to `base_url`.
        streaming_path: Option<String>,
        /// Restart behavior on unexpected disconnect.
        #[serde(default)]
        restart: RestartConfig,
    },
    /// Instantiate an in-process server speaking MCP over an in-memory
    /// channel (used for the reference `echo` server and for tests).
    InProcess {
        /// Fully-qualified module/factory identifier.
        module: String,
        /// Class/factory name within the module.
        class: String,
        /// Arbitrary configuration passed to the factory.
        #[serde(default)]
        config: serde_json::Map<String, serde_json::Value>,
    },
}

/// HTTP authentication for the HTTP MCP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HttpAuthConfig {
    /// `Authorization: Bearer <token>`.
    Bearer {
        /// The bearer token.
        bearer: String,
    },
    /// An arbitrary header/value pair.
    Header {
        /// Header name.
        header: String,
        /// Header value.
        value: String,
    },
}

/// Restart policy for a server whose transport disconnects unexpectedly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Whether reconnection is attempted at all.
    #[serde(default)]
    pub enabled: bool,
    /// Ceiling for the exponential backoff, in seconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
}

fn default_max_backoff() -> u64 {
    30
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_backoff_seconds: default_max_backoff(),
        }
    }
}

/// Whether a server is connected eagerly at startup or lazily on first use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectMode {
    /// Connect only when first used.
    #[default]
    Lazy,
    /// Connect during kernel startup.
    Eager,
}

/// A named server table entry, combining the transport descriptor with
/// enablement and connect-mode flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntryConfig {
    /// Whether the server participates in discovery/connection at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether to connect eagerly at startup.
    #[serde(default)]
    pub connect: ConnectMode,
    /// The transport descriptor.
    #[serde(flatten)]
    pub descriptor: ServerDescriptorConfig,
}

fn default_true() -> bool {
    true
}

/// Event bus tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Bounded ring buffer capacity for replay.
    #[serde(default = "default_replay_buffer_size")]
    pub replay_buffer_size: usize,
    /// Default per-subscriber inbox capacity.
    #[serde(default = "default_inbox_size")]
    pub default_inbox_size: usize,
    /// How long a `required` publish blocks on a full inbox before the
    /// subscriber is marked lagging and the publish completes degraded.
    #[serde(default = "default_required_publish_deadline_ms")]
    pub required_publish_deadline_ms: u64,
}

fn default_replay_buffer_size() -> usize {
    4096
}

fn default_inbox_size() -> usize {
    1024
}

fn default_required_publish_deadline_ms() -> u64 {
    5000
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            replay_buffer_size: default_replay_buffer_size(),
            default_inbox_size: default_inbox_size(),
            required_publish_deadline_ms: default_required_publish_deadline_ms(),
        }
    }
}

/// MCP client tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpClientConfig {
    /// Default deadline for `call_tool` when the caller supplies none.
    #[serde(default = "default_call_deadline_ms")]
    pub default_call_deadline_ms: u64,
    /// Deadline for the `initialize`/`initialized` handshake.
    #[serde(default = "default_handshake_deadline_ms")]
    pub handshake_deadline_ms: u64,
}

fn default_call_deadline_ms() -> u64 {
    30_000
}

fn default_handshake_deadline_ms() -> u64 {
    10_000
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            default_call_deadline_ms: default_call_deadline_ms(),
            handshake_deadline_ms: default_handshake_deadline_ms(),
        }
    }
}

/// Logging configuration, translated into a `tracing` subscriber at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level emitted.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The full configuration tree read by the kernel at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Named MCP server table.
    #[serde(default)]
    pub servers: HashMap<String, ServerEntryConfig>,
    /// Filesystem roots scanned for plugin units.
    #[serde(default)]
    pub plugin_roots: Vec<PathBuf>,
    /// Event bus tuning.
    #[serde(default)]
    pub event_bus: EventBusConfig,
    /// MCP client tuning.
    #[serde(default)]
    pub mcp_client: McpClientConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its TOML is malformed.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from a path if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.event_bus.replay_buffer_size, 4096);
        assert_eq!(config.event_bus.default_inbox_size, 1024);
        assert_eq!(config.event_bus.required_publish_deadline_ms, 5000);
        assert_eq!(config.mcp_client.default_call_deadline_ms, 30_000);
        assert_eq!(config.mcp_client.handshake_deadline_ms, 10_000);
    }

    #[test]
    fn parses_child_process_server() {
        let toml = r#"
plugin_roots = ["/tmp/plugins"]

[servers.filesystem]
kind = "child-process"
command = "npx"
args = ["-y", "@anthropics/mcp-server-filesystem", "/tmp"]
connect = "eager"
"#;
        let config: RuntimeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.plugin_roots, vec![PathBuf::from("/tmp/plugins")]);
        let entry = &config.servers["filesystem"];
        assert_eq!(entry.connect, ConnectMode::Eager);
        match &entry.descriptor {
            ServerDescriptorConfig::ChildProcess { command, args, .. } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 3);
            },
            other => panic!("expected child-process, got {other:?}"),
        }
    }

    #[test]
    fn parses_http_server_with_bearer_auth() {
        let toml = r#"
[servers.remote]
kind = "http"
base_url = "https://example.com/mcp"
streaming_path = "/events"

[servers.remote.auth]
bearer = "secret-token"
"#;
        let config: RuntimeConfig = toml::from_str(toml).unwrap();
        match &config.servers["remote"].descriptor {
            ServerDescriptorConfig::Http {
                base_url, auth, ..
            } => {
                assert_eq!(base_url, "https://example.com/mcp");
                assert!(matches!(auth, Some(HttpAuthConfig::Bearer { .. })));
            },
            other => panic!("expected http, got {other:?}"),
        }
    }
}
