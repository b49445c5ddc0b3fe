//! Publish-pipeline middleware: observes, annotates, or drops an envelope
//! before fan-out.

use async_trait::async_trait;

use crate::envelope::EventEnvelope;

/// What a middleware decides to do with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareAction {
    /// Let the envelope continue to the next middleware / fan-out.
    Continue,
    /// Drop the envelope. Nothing is published; the sequence number is
    /// still consumed.
    Drop,
}

/// A function in the publish pipeline, run in registration order.
///
/// Middleware may mutate the envelope in place (to annotate it) and may
/// itself await (a documented suspension point).
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Inspect, and optionally mutate, `envelope`; decide whether it
    /// continues through the pipeline.
    async fn process(&self, envelope: &mut EventEnvelope) -> MiddlewareAction;
}
