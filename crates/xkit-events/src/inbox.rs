//! Per-subscriber bounded inbox.
//!
//! `best_effort` subscribers never block a publisher: a full inbox drops
//! its oldest undelivered envelope to make room for the newest, and counts
//! the drop. `required` subscribers block the publish call (only that
//! publish) until space frees up or a deadline elapses.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use crate::envelope::EventEnvelope;

struct InboxState {
    queue: VecDeque<EventEnvelope>,
    closed: bool,
    dropped_count: u64,
}

/// A bounded, single-consumer inbox of envelopes awaiting delivery to one
/// subscriber's handler.
pub struct Inbox {
    capacity: usize,
    state: Mutex<InboxState>,
    item_available: Notify,
    space_available: Notify,
}

/// Returned by [`Inbox::push_required`] when the deadline elapses before
/// room becomes available.
#[derive(Debug, Clone, Copy)]
pub struct RequiredPushTimedOut;

impl Inbox {
    /// Create an inbox with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(InboxState {
                queue: VecDeque::new(),
                closed: false,
                dropped_count: 0,
            }),
            item_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    /// Total envelopes dropped due to a full inbox since creation.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).dropped_count
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).queue.len()
    }

    /// Whether the inbox is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push an envelope, dropping the oldest undelivered one if the inbox
    /// is already at capacity. Returns `true` if an envelope was dropped.
    pub fn push_best_effort(&self, envelope: EventEnvelope) -> bool {
        let dropped = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let dropped = if state.queue.len() >= self.capacity {
                state.queue.pop_front();
                state.dropped_count += 1;
                true
            } else {
                false
            };
            state.queue.push_back(envelope);
            dropped
        };
        self.item_available.notify_one();
        dropped
    }

    /// Push an envelope, waiting for room if the inbox is full, up to
    /// `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`RequiredPushTimedOut`] if `deadline` elapses before room
    /// becomes available; the envelope is not enqueued.
    pub async fn push_required(
        &self,
        envelope: EventEnvelope,
        deadline: Duration,
    ) -> Result<(), RequiredPushTimedOut> {
        let result = timeout(deadline, async {
            loop {
                {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    if state.queue.len() < self.capacity {
                        state.queue.push_back(envelope);
                        break;
                    }
                }
                self.space_available.notified().await;
            }
        })
        .await;

        match result {
            Ok(()) => {
                self.item_available.notify_one();
                Ok(())
            },
            Err(_) => Err(RequiredPushTimedOut),
        }
    }

    /// Wait for and remove the next envelope, or `None` once the inbox is
    /// closed and drained.
    pub async fn pop(&self) -> Option<EventEnvelope> {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(envelope) = state.queue.pop_front() {
                    drop(state);
                    self.space_available.notify_one();
                    return Some(envelope);
                }
                if state.closed {
                    return None;
                }
            }
            self.item_available.notified().await;
        }
    }

    /// Mark the inbox closed; any pending or future `pop` returns `None`
    /// once drained.
    pub fn close(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        self.item_available.notify_waiters();
        self.space_available.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use xkit_core::ids::EventTypeName;

    fn envelope(seq: u64) -> EventEnvelope {
        EventEnvelope {
            sequence: seq,
            event_type: EventTypeName::new("test.event").unwrap(),
            payload: json!({"seq": seq}),
            published_at: chrono::Utc::now(),
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn best_effort_drops_oldest_when_full() {
        let inbox = Inbox::new(2);
        assert!(!inbox.push_best_effort(envelope(1)));
        assert!(!inbox.push_best_effort(envelope(2)));
        assert!(inbox.push_best_effort(envelope(3)));
        assert_eq!(inbox.dropped_count(), 1);

        let first = inbox.pop().await.unwrap();
        assert_eq!(first.sequence, 2);
        let second = inbox.pop().await.unwrap();
        assert_eq!(second.sequence, 3);
    }

    #[tokio::test]
    async fn required_push_times_out_when_full() {
        let inbox = Inbox::new(1);
        inbox.push_best_effort(envelope(1));
        let result = inbox
            .push_required(envelope(2), Duration::from_millis(20))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn required_push_unblocks_after_pop() {
        let inbox = std::sync::Arc::new(Inbox::new(1));
        inbox.push_best_effort(envelope(1));

        let inbox2 = inbox.clone();
        let handle = tokio::spawn(async move {
            inbox2
                .push_required(envelope(2), Duration::from_millis(500))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let popped = inbox.pop().await.unwrap();
        assert_eq!(popped.sequence, 1);

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn pop_returns_none_after_close_when_drained() {
        let inbox = Inbox::new(4);
        inbox.close();
        assert!(inbox.pop().await.is_none());
    }
}
