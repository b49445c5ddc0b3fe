//! Shared ids, ports, configuration, and logging for the xkit runtime.
//!
//! This crate has no knowledge of MCP, events, or plugins; it exists so
//! those crates (and the kernel that wires them) can depend on the same
//! identifier types, error taxonomy, and hexagonal ports without a cyclic
//! dependency between them.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod dirs;
pub mod error;
pub mod ids;
pub mod logging;
pub mod outcome;
pub mod ports;
pub mod prelude;
