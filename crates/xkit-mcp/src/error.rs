//! MCP client error types.

use thiserror::Error;
use xkit_core::ids::ServerName;
use xkit_protocol::error::ProtocolError;

/// Errors raised by the MCP client.
#[derive(Debug, Error)]
pub enum McpError {
    /// No server is registered under this name.
    #[error("no server registered as {0}")]
    UnknownServer(ServerName),

    /// A server was already registered under this name.
    #[error("server {0} is already registered")]
    DuplicateServer(ServerName),

    /// The server's transport (child process or HTTP connection) failed.
    #[error("transport error talking to {server}: {source}")]
    Transport {
        /// The server involved.
        server: ServerName,
        /// Underlying port failure.
        #[source]
        source: xkit_core::error::PortError,
    },

    /// A framed message failed to parse.
    #[error("protocol error talking to {server}: {source}")]
    Protocol {
        /// The server involved.
        server: ServerName,
        /// Underlying framing/parsing failure.
        #[source]
        source: ProtocolError,
    },

    /// The `initialize`/`initialized` handshake did not complete in time.
    #[error("handshake with {0} timed out")]
    HandshakeTimeout(ServerName),

    /// A `tools/call` request did not complete in time.
    #[error("call to {server}:{tool} timed out")]
    CallTimeout {
        /// The server involved.
        server: ServerName,
        /// The tool requested.
        tool: String,
    },

    /// The server returned a JSON-RPC error object for a call.
    #[error("{server}:{tool} failed: {message}")]
    ToolCallFailed {
        /// The server involved.
        server: ServerName,
        /// The tool requested.
        tool: String,
        /// The error message returned by the server.
        message: String,
    },

    /// The requested tool is not in the server's discovered tool set.
    #[error("server {server} has no tool named {tool}")]
    UnknownTool {
        /// The server involved.
        server: ServerName,
        /// The tool requested.
        tool: String,
    },

    /// The server connection is not in a state that can serve the request.
    #[error("server {0} is not connected")]
    NotConnected(ServerName),
}

/// Result alias for MCP client operations.
pub type McpResult<T> = Result<T, McpError>;
