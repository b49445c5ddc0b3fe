//! JSON-RPC 2.0 framing and parsing for the MCP wire protocol.
//!
//! Two transports are supported: a line-delimited child-process stream (one
//! JSON object per line, default 8 MiB max) and an HTTP transport (plain
//! request/response bodies plus a server-sent-event style streaming
//! endpoint for server-initiated messages).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod codec;
pub mod error;
pub mod message;
pub mod prelude;
