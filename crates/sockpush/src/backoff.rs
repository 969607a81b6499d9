//! Exponential reconnect delay.

use std::time::Duration;

/// Doubling delay between connect attempts, capped at a ceiling.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) const fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Returns the delay to sleep now and doubles the next one.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Returns to the floor after a successful connect.
    pub(crate) const fn reset(&mut self) {
        self.current = self.min;
    }

    #[cfg(test)]
    pub(crate) const fn current(&self) -> Duration {
        self.current
    }
}
