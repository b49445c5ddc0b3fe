//! The hexagonal core: ports, command registry, and the single `dispatch`
//! entry point consumed by the CLI.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kernel;
pub mod ports;
pub mod prelude;
pub mod registry;
pub mod suggest;
