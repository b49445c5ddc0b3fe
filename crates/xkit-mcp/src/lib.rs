//! MCP client: named server connections over child-process or HTTP
//! transports, the `initialize`/`initialized` handshake, tool discovery,
//! tool calls, and reconnection with backoff.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod prelude;
pub mod types;
