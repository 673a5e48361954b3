//! # Fibonacci Backoff
//!
//! Requeue delays for failed reconciliations. The delay grows along the
//! Fibonacci sequence, which backs off more gently than doubling: a cloud
//! API that is briefly throttling gets retried soon, one that stays broken
//! settles at the cap.
//!
//! Sequence with the controller defaults (5s min, 300s max):
//! 5s, 5s, 10s, 15s, 25s, 40s, 65s, 105s, 170s, 275s, 300s, 300s, ...

use std::time::Duration;

/// Fibonacci backoff calculator, in whole seconds.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_seconds: u64,
    prev_seconds: u64,
    current_seconds: u64,
    max_seconds: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff
    ///
    /// # Arguments
    ///
    /// * `min` - first (and second) delay
    /// * `max` - cap of the sequence
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_seconds = min.as_secs().max(1);
        Self {
            min_seconds,
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds: max.as_secs().max(min_seconds),
        }
    }

    /// Returns the current delay and advances the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_seconds;

        let next = self.prev_seconds + self.current_seconds;
        self.prev_seconds = self.current_seconds;
        self.current_seconds = next.min(self.max_seconds);

        Duration::from_secs(result)
    }

    /// Restarts the sequence after a success.
    pub fn reset(&mut self) {
        self.prev_seconds = 0;
        self.current_seconds = self.min_seconds;
    }
}
