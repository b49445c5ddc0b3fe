//! The immutable envelope wrapping a published event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use xkit_core::ids::{CorrelationId, EventTypeName, SequenceNumber};

/// A published event, immutable once created.
///
/// Retained in the bus's bounded replay buffer until displaced by newer
/// envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Strictly increasing within the process.
    pub sequence: SequenceNumber,
    /// The declared event type this envelope carries.
    pub event_type: EventTypeName,
    /// The event payload.
    pub payload: Value,
    /// When the event was published.
    pub published_at: DateTime<Utc>,
    /// Optional id threading this event to the activity that caused it.
    pub correlation_id: Option<CorrelationId>,
}
