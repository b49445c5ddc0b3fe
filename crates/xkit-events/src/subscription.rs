//! Subscriptions: who is listening, how failures are treated, and the
//! lagging/detached state machine.

use async_trait::async_trait;

use crate::envelope::EventEnvelope;

/// How the bus treats a subscriber's failures and backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Failures and full inboxes never affect the publisher. The oldest
    /// undelivered envelope is dropped to make room for the newest.
    BestEffort,
    /// A full inbox blocks the publish call (only that publish) up to a
    /// configured deadline; on failure to catch up the subscriber is marked
    /// `lagging` and eventually `detached`.
    Required,
}

/// Lifecycle of a subscriber's delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Keeping up with publishes.
    Active,
    /// Falling behind; still subscribed.
    Lagging,
    /// Unsubscribed after failing to catch up; a `SubscriberDetached` event
    /// has been published on its behalf.
    Detached,
}

/// A function invoked by the bus when a matching event is published.
///
/// Handlers are invoked as independent cooperative tasks: a failing handler
/// (an `Err` return, or a panic) never affects other handlers or the
/// publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one envelope.
    ///
    /// # Errors
    ///
    /// Returning an error marks this invocation as failed; the bus logs it
    /// and publishes a `HandlerFailed` event. It never propagates to other
    /// handlers or the publisher.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&EventEnvelope) -> Result<(), String> + Send + Sync,
{
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String> {
        self(envelope)
    }
}

/// An optional predicate narrowing which envelopes of a subscribed event
/// type actually reach the handler.
pub type FilterPredicate = Box<dyn Fn(&EventEnvelope) -> bool + Send + Sync>;
