//! The event bus: typed publish/subscribe with ordered middleware, bounded
//! replay, and per-subscriber backpressure.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;

use xkit_core::config::EventBusConfig;
use xkit_core::ids::{CorrelationId, EventTypeName, SequenceNumber, SubscriptionId};

use crate::catalog;
use crate::envelope::EventEnvelope;
use crate::error::{EventBusError, EventBusResult};
use crate::inbox::Inbox;
use crate::middleware::{Middleware, MiddlewareAction};
use crate::subscription::{DeliveryMode, EventHandler, FilterPredicate, SubscriberState};

/// Consecutive `required` backpressure timeouts after which a subscriber is
/// detached.
const LAG_STRIKES_BEFORE_DETACH: u32 = 3;

/// What a `publish` call returns to its caller.
#[derive(Debug, Clone, Copy)]
pub struct PublishOutcome {
    /// The sequence number assigned to this publish (consumed even if the
    /// envelope was subsequently dropped by middleware).
    pub sequence: SequenceNumber,
    /// Whether the publish completed in a degraded state because a
    /// `required` subscriber's inbox could not make room in time.
    pub degraded: bool,
    /// Whether the envelope was actually delivered to any subscriber (it is
    /// not if a middleware dropped it).
    pub delivered: bool,
}

struct SubscriberRecord {
    id: SubscriptionId,
    subscriber_id: String,
    mode: DeliveryMode,
    filter: Option<FilterPredicate>,
    inbox: Arc<Inbox>,
    state: std::sync::atomic::AtomicU8,
    lag_strikes: AtomicU32,
    consumer: JoinHandle<()>,
}

impl SubscriberRecord {
    fn state(&self) -> SubscriberState {
        match self.state.load(Ordering::SeqCst) {
            0 => SubscriberState::Active,
            1 => SubscriberState::Lagging,
            _ => SubscriberState::Detached,
        }
    }

    fn set_state(&self, state: SubscriberState) {
        let v = match state {
            SubscriberState::Active => 0,
            SubscriberState::Lagging => 1,
            SubscriberState::Detached => 2,
        };
        self.state.store(v, Ordering::SeqCst);
    }
}

struct Inner {
    config: EventBusConfig,
    declared_types: RwLock<HashMap<EventTypeName, Value>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<SubscriberRecord>>>,
    by_event: RwLock<HashMap<EventTypeName, Vec<SubscriptionId>>>,
    replay: RwLock<VecDeque<EventEnvelope>>,
    next_seq: AtomicU64,
    // Serializes the assign-sequence -> fan-out -> replay-append span of
    // `publish` so concurrent publishers can't interleave at an await point
    // and deliver envelopes to a subscriber or the replay buffer out of
    // sequence order. Not held across the nested `publish` call `detach`
    // makes (that call takes its own turn through the critical section).
    publish_lock: Mutex<()>,
}

/// Typed publish/subscribe event bus.
///
/// Cheap to clone: all state lives behind a shared `Arc`, matching the
/// pattern used by the other long-lived service handles in this runtime.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a new bus tuned by `config`.
    #[must_use]
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                declared_types: RwLock::new(HashMap::new()),
                middleware: RwLock::new(Vec::new()),
                subscriptions: RwLock::new(HashMap::new()),
                by_event: RwLock::new(HashMap::new()),
                replay: RwLock::new(VecDeque::new()),
                next_seq: AtomicU64::new(1),
                publish_lock: Mutex::new(()),
            }),
        }
    }

    /// Declare an event type and its schema.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SchemaConflict`] if `event_type` was already
    /// declared with a different schema.
    pub async fn declare(&self, event_type: EventTypeName, schema: Value) -> EventBusResult<()> {
        let mut declared = self.inner.declared_types.write().await;
        match declared.get(&event_type) {
            Some(existing) if *existing != schema => {
                Err(EventBusError::SchemaConflict(event_type))
            },
            Some(_) => Ok(()),
            None => {
                declared.insert(event_type, schema);
                Ok(())
            },
        }
    }

    /// Declare every built-in event type contributed by the core, using an
    /// empty (unconstrained) schema.
    pub async fn declare_builtin_types(&self) {
        for name in catalog::ALL {
            let event_type = EventTypeName::new(*name).expect("builtin names are valid");
            let _ = self.declare(event_type, Value::Null).await;
        }
    }

    /// Register a handler for `event_type`.
    pub async fn subscribe(
        &self,
        event_type: EventTypeName,
        subscriber_id: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        mode: DeliveryMode,
        filter: Option<FilterPredicate>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let inbox = Arc::new(Inbox::new(self.inner.config.default_inbox_size));
        let subscriber_id = subscriber_id.into();

        let consumer_inbox = inbox.clone();
        let consumer = tokio::spawn(Self::run_consumer(
            self.clone(),
            event_type.clone(),
            subscriber_id.clone(),
            consumer_inbox,
            handler,
        ));

        let record = Arc::new(SubscriberRecord {
            id,
            subscriber_id,
            mode,
            filter,
            inbox,
            state: std::sync::atomic::AtomicU8::new(0),
            lag_strikes: AtomicU32::new(0),
            consumer,
        });

        self.inner.subscriptions.write().await.insert(id, record);
        self.inner
            .by_event
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(id);

        id
    }

    async fn run_consumer(
        bus: EventBus,
        event_type: EventTypeName,
        subscriber_id: String,
        inbox: Arc<Inbox>,
        handler: Arc<dyn EventHandler>,
    ) {
        while let Some(envelope) = inbox.pop().await {
            let outcome = AssertUnwindSafe(handler.handle(&envelope))
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(message)) => Some(message),
                Err(panic) => Some(describe_panic(&panic)),
            };

            if let Some(cause) = failure {
                warn!(
                    event_type = %event_type,
                    subscriber = %subscriber_id,
                    %cause,
                    "event handler failed"
                );
                if event_type.as_str() != catalog::HANDLER_FAILED {
                    bus.publish_handler_failed(&event_type, &subscriber_id, &cause)
                        .await;
                }
            }
        }
    }

    async fn publish_handler_failed(&self, event_type: &EventTypeName, subscriber_id: &str, cause: &str) {
        let payload = serde_json::json!({
            "event_type": event_type.as_str(),
            "subscriber_id": subscriber_id,
            "cause": cause,
        });
        let handler_failed = EventTypeName::new(catalog::HANDLER_FAILED)
            .expect("builtin name is valid");
        let _ = self.publish(handler_failed, payload, None).await;
    }

    /// Remove a single subscription.
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) {
        let removed = self.inner.subscriptions.write().await.remove(&subscription_id);
        if let Some(record) = removed {
            record.inbox.close();
            record.consumer.abort();
            let mut by_event = self.inner.by_event.write().await;
            for ids in by_event.values_mut() {
                ids.retain(|id| *id != subscription_id);
            }
        }
    }

    /// The subscription ids currently owned by `subscriber_id`.
    ///
    /// Useful for capturing a snapshot before an operation (like a plugin
    /// hot-reload) that may register new subscriptions under the same
    /// subscriber id, so only the pre-existing ones are later removed.
    pub async fn subscriptions_owned_by(&self, subscriber_id: &str) -> Vec<SubscriptionId> {
        self.inner
            .subscriptions
            .read()
            .await
            .values()
            .filter(|record| record.subscriber_id == subscriber_id)
            .map(|record| record.id)
            .collect()
    }

    /// Remove every subscription owned by `subscriber_id` (used by plugin
    /// unload, so an unloaded plugin can never be orphan-subscribed).
    pub async fn unsubscribe_owner(&self, subscriber_id: &str) {
        for id in self.subscriptions_owned_by(subscriber_id).await {
            self.unsubscribe(id).await;
        }
    }

    /// Publish an event.
    ///
    /// Assigns a sequence number, runs middleware in registration order,
    /// fans out to matching subscribers, and appends the envelope to the
    /// replay buffer.
    pub async fn publish(
        &self,
        event_type: EventTypeName,
        payload: Value,
        correlation_id: Option<CorrelationId>,
    ) -> EventBusResult<PublishOutcome> {
        let guard = self.inner.publish_lock.lock().await;

        let sequence = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut envelope = EventEnvelope {
            sequence,
            event_type: event_type.clone(),
            payload,
            published_at: chrono::Utc::now(),
            correlation_id,
        };

        for middleware in self.inner.middleware.read().await.iter() {
            match middleware.process(&mut envelope).await {
                MiddlewareAction::Continue => {},
                MiddlewareAction::Drop => {
                    drop(guard);
                    return Ok(PublishOutcome {
                        sequence,
                        degraded: false,
                        delivered: false,
                    });
                },
            }
        }

        let mut degraded = false;
        let mut to_detach: Vec<(SubscriptionId, String)> = Vec::new();

        let subscriber_ids = self
            .inner
            .by_event
            .read()
            .await
            .get(&event_type)
            .cloned()
            .unwrap_or_default();
        let subscriptions = self.inner.subscriptions.read().await;

        for id in subscriber_ids {
            let Some(record) = subscriptions.get(&id) else {
                continue;
            };
            if record.state() == SubscriberState::Detached {
                continue;
            }
            if let Some(filter) = &record.filter {
                if !filter(&envelope) {
                    continue;
                }
            }

            match record.mode {
                DeliveryMode::BestEffort => {
                    record.inbox.push_best_effort(envelope.clone());
                },
                DeliveryMode::Required => {
                    let deadline = Duration::from_millis(self.inner.config.required_publish_deadline_ms);
                    match record.inbox.push_required(envelope.clone(), deadline).await {
                        Ok(()) => {
                            record.lag_strikes.store(0, Ordering::SeqCst);
                            if record.state() == SubscriberState::Lagging {
                                record.set_state(SubscriberState::Active);
                            }
                        },
                        Err(_) => {
                            degraded = true;
                            record.set_state(SubscriberState::Lagging);
                            let strikes = record.lag_strikes.fetch_add(1, Ordering::SeqCst) + 1;
                            if strikes >= LAG_STRIKES_BEFORE_DETACH {
                                record.set_state(SubscriberState::Detached);
                                to_detach.push((id, record.subscriber_id.clone()));
                            }
                        },
                    }
                },
            }
        }
        drop(subscriptions);

        let mut replay = self.inner.replay.write().await;
        if replay.len() >= self.inner.config.replay_buffer_size {
            replay.pop_front();
        }
        replay.push_back(envelope);
        drop(replay);

        // Release the critical section before the nested `publish` calls
        // `detach` makes below; the mutex isn't reentrant. Every subscriber
        // has already been delivered to (or skipped) and the envelope is
        // already in the replay buffer, so detaching after the fact doesn't
        // affect this publish's own ordering guarantees.
        drop(guard);

        for (id, subscriber_id) in to_detach {
            self.detach(id, &subscriber_id).await;
        }

        Ok(PublishOutcome {
            sequence,
            degraded,
            delivered: true,
        })
    }

    async fn detach(&self, subscription_id: SubscriptionId, subscriber_id: &str) {
        self.unsubscribe(subscription_id).await;
        let payload = serde_json::json!({ "subscriber_id": subscriber_id });
        let detached = EventTypeName::new(catalog::SUBSCRIBER_DETACHED)
            .expect("builtin name is valid");
        let _ = Box::pin(self.publish(detached, payload, None)).await;
    }

    /// Register publish-pipeline middleware, run in registration order.
    pub async fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner.middleware.write().await.push(middleware);
    }

    /// Return the still-buffered envelopes with sequence `>= from_sequence`,
    /// optionally narrowed to one event type, in order.
    pub async fn replay(
        &self,
        from_sequence: SequenceNumber,
        event_type: Option<&EventTypeName>,
    ) -> Vec<EventEnvelope> {
        self.inner
            .replay
            .read()
            .await
            .iter()
            .filter(|e| e.sequence >= from_sequence)
            .filter(|e| event_type.is_none_or(|t| &e.event_type == t))
            .cloned()
            .collect()
    }

    /// Current state of a subscriber, if it is still known to the bus.
    pub async fn subscriber_state(&self, subscription_id: SubscriptionId) -> Option<SubscriberState> {
        self.inner
            .subscriptions
            .read()
            .await
            .get(&subscription_id)
            .map(|record| record.state())
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use xkit_core::config::EventBusConfig;

    fn event_type(name: &str) -> EventTypeName {
        EventTypeName::new(name).unwrap()
    }

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _envelope: &EventEnvelope) -> Result<(), String> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let bus = EventBus::new(EventBusConfig::default());
        let ping = event_type("Ping");
        bus.declare(ping.clone(), Value::Null).await.unwrap();

        let mut sequences = Vec::new();
        for _ in 0..5 {
            let outcome = bus.publish(ping.clone(), Value::Null, None).await.unwrap();
            sequences.push(outcome.sequence);
        }
        for window in sequences.windows(2) {
            assert!(window[1] > window[0]);
        }
    }

    #[tokio::test]
    async fn failure_isolation_h2_still_runs_when_h1_fails() {
        let bus = EventBus::new(EventBusConfig::default());
        let ping = event_type("Ping");
        bus.declare(ping.clone(), Value::Null).await.unwrap();

        let h1_count = Arc::new(AtomicUsize::new(0));
        let h2_count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            ping.clone(),
            "h1",
            Arc::new(CountingHandler {
                count: h1_count.clone(),
                fail: true,
            }),
            DeliveryMode::BestEffort,
            None,
        )
        .await;
        bus.subscribe(
            ping.clone(),
            "h2",
            Arc::new(CountingHandler {
                count: h2_count.clone(),
                fail: false,
            }),
            DeliveryMode::BestEffort,
            None,
        )
        .await;

        for _ in 0..100 {
            bus.publish(ping.clone(), Value::Null, None).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h1_count.load(Ordering::SeqCst), 100);
        assert_eq!(h2_count.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn replay_returns_envelopes_from_sequence() {
        let bus = EventBus::new(EventBusConfig::default());
        let ping = event_type("Ping");
        bus.declare(ping.clone(), Value::Null).await.unwrap();

        for _ in 0..10 {
            bus.publish(ping.clone(), Value::Null, None).await.unwrap();
        }

        let replayed = bus.replay(6, None).await;
        assert_eq!(replayed.len(), 5);
        assert!(replayed.iter().all(|e| e.sequence >= 6));
    }

    #[tokio::test]
    async fn schema_conflict_is_rejected() {
        let bus = EventBus::new(EventBusConfig::default());
        let t = event_type("Typed");
        bus.declare(t.clone(), serde_json::json!({"type": "a"}))
            .await
            .unwrap();
        let err = bus
            .declare(t, serde_json::json!({"type": "b"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EventBusError::SchemaConflict(_)));
    }

    #[tokio::test]
    async fn required_subscriber_detaches_after_repeated_lag() {
        let mut config = EventBusConfig::default();
        config.default_inbox_size = 1;
        config.required_publish_deadline_ms = 10;
        let bus = EventBus::new(config);
        let ping = event_type("Ping");
        bus.declare(ping.clone(), Value::Null).await.unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        // A handler that never drains (sleeps far past the deadline) so the
        // inbox stays full and every subsequent required push times out.
        struct SlowHandler {
            count: Arc<AtomicUsize>,
        }
        #[async_trait::async_trait]
        impl EventHandler for SlowHandler {
            async fn handle(&self, _e: &EventEnvelope) -> Result<(), String> {
                self.count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        }

        let id = bus
            .subscribe(
                ping.clone(),
                "slow",
                Arc::new(SlowHandler { count: count.clone() }),
                DeliveryMode::Required,
                None,
            )
            .await;

        for _ in 0..LAG_STRIKES_BEFORE_DETACH + 1 {
            bus.publish(ping.clone(), Value::Null, None).await.unwrap();
        }

        assert_eq!(bus.subscriber_state(id).await, None);
    }
}
