//! Reconnection backoff: 1s, 2s, 4s, 8s, 16s, then steady at 30s.

use std::time::Duration;

const SCHEDULE_SECONDS: &[u64] = &[1, 2, 4, 8, 16];
const STEADY_SECONDS: u64 = 30;

/// Deterministic reconnection backoff.
///
/// Unlike a jittered backoff, the delay sequence is fixed so reconnection
/// timing in tests and logs is reproducible.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: usize,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    /// Start a fresh backoff at attempt zero.
    #[must_use]
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// The delay for the next attempt, advancing the internal counter.
    pub fn next_delay(&mut self) -> Duration {
        let seconds = SCHEDULE_SECONDS
            .get(self.attempt)
            .copied()
            .unwrap_or(STEADY_SECONDS);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs(seconds)
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of attempts made since the last reset.
    #[must_use]
    pub fn attempt(&self) -> usize {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_documented_schedule() {
        let mut backoff = Backoff::new();
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];
        for seconds in expected {
            assert_eq!(backoff.next_delay(), Duration::from_secs(seconds));
        }
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::new();
        for _ in 0..3 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
