//! Typed publish/subscribe event bus: ordered middleware, bounded replay,
//! and per-subscriber backpressure with lag detection.
//!
//! Delivery to each subscriber runs on its own task, reading from a bounded
//! [`inbox::Inbox`]. A handler's failure (an `Err` return, or a panic) never
//! affects other handlers or the publisher; it surfaces only as a
//! `HandlerFailed` event.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bus;
pub mod catalog;
pub mod envelope;
pub mod error;
pub mod inbox;
pub mod middleware;
pub mod prelude;
pub mod subscription;
