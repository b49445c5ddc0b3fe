//! Tool definitions and call results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use xkit_core::ids::{ServerName, ToolName};

/// A tool discovered on a connected server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, scoped to its server.
    pub name: ToolName,
    /// The server this tool belongs to.
    pub server: ServerName,
    /// Human-readable description, if the server provided one.
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// The `server:tool` identifier used in logs and error messages.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.server, self.name)
    }
}

/// The outcome of a `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Structured or text content returned by the tool.
    pub content: Value,
    /// Error message, set only when `success` is `false`.
    pub error: Option<String>,
}

impl ToolResult {
    /// Build a successful result.
    #[must_use]
    pub fn ok(content: Value) -> Self {
        Self {
            success: true,
            content,
            error: None,
        }
    }

    /// Build a failed result.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: Value::Null,
            error: Some(message.into()),
        }
    }
}
