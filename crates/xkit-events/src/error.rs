//! Event bus error types.

use thiserror::Error;

use xkit_core::ids::EventTypeName;

/// Errors raised by the event bus.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// An event type was declared twice with different schemas.
    #[error("event type {0} already declared with a different schema")]
    SchemaConflict(EventTypeName),

    /// A publish targeted an event type nobody declared.
    #[error("event type {0} was never declared")]
    UnknownEventType(EventTypeName),
}

/// Result alias for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;
