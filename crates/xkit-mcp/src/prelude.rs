//! Convenience re-exports for consumers of this crate.

pub use crate::backoff::Backoff;
pub use crate::client::McpClient;
pub use crate::connection::{ConnectionState, ServerConnection};
pub use crate::error::{McpError, McpResult};
pub use crate::types::{ToolDefinition, ToolResult};
