//! Tunables for a single [`Connection`](crate::Connection).

use std::time::Duration;

const DEFAULT_MAX_READERS: usize = 4;
const DEFAULT_MAX_SUBSCRIBERS: usize = 4;
const DEFAULT_MAX_LINE_BYTES: usize = 1024;
const DEFAULT_BACKOFF_MIN: Duration = Duration::from_secs(1);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity and reconnect settings applied when a connection opens.
///
/// Reader and subscriber capacities are hard limits: registering beyond them
/// fails immediately instead of blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    max_readers: usize,
    max_subscribers: usize,
    max_line_bytes: usize,
    backoff_min: Duration,
    backoff_max: Duration,
    connect_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_readers: DEFAULT_MAX_READERS,
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            backoff_min: DEFAULT_BACKOFF_MIN,
            backoff_max: DEFAULT_BACKOFF_MAX,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectionOptions {
    /// Sets the reader handle capacity.
    #[must_use]
    pub const fn with_max_readers(mut self, max_readers: usize) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// Sets the push subscriber capacity.
    #[must_use]
    pub const fn with_max_subscribers(mut self, max_subscribers: usize) -> Self {
        self.max_subscribers = max_subscribers;
        self
    }

    /// Sets the longest accepted inbound line. Zero is raised to one byte.
    #[must_use]
    pub const fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = if max_line_bytes == 0 { 1 } else { max_line_bytes };
        self
    }

    /// Sets the reconnect backoff bounds; a ceiling below the floor is raised
    /// to the floor.
    #[must_use]
    pub const fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = if max.as_nanos() < min.as_nanos() { min } else { max };
        self
    }

    /// Sets the timeout for a single connect attempt.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Reader handle capacity.
    #[must_use]
    pub const fn max_readers(&self) -> usize {
        self.max_readers
    }

    /// Push subscriber capacity.
    #[must_use]
    pub const fn max_subscribers(&self) -> usize {
        self.max_subscribers
    }

    /// Longest accepted inbound line in bytes.
    #[must_use]
    pub const fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// First reconnect delay.
    #[must_use]
    pub const fn backoff_min(&self) -> Duration {
        self.backoff_min
    }

    /// Reconnect delay ceiling.
    #[must_use]
    pub const fn backoff_max(&self) -> Duration {
        self.backoff_max
    }

    /// Timeout for a single connect attempt.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}
