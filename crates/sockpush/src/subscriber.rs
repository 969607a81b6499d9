//! Push subscribers notified synchronously for every line that crosses the
//! connection.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::CONNECTION_TARGET;

/// Direction a line travelled relative to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the daemon.
    Inbound,
    /// Written to the daemon.
    Outbound,
}

/// Which directions a subscriber wants to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Lines received from the daemon.
    Inbound,
    /// Requests written to the daemon.
    Outbound,
    /// Traffic in both directions.
    Both,
}

impl Interest {
    /// Whether a line travelling in `direction` matches this interest.
    #[must_use]
    pub const fn matches(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Self::Both, _)
                | (Self::Inbound, Direction::Inbound)
                | (Self::Outbound, Direction::Outbound)
        )
    }
}

/// Identifies a registered subscriber so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked with each matching line.
///
/// The callback runs on the line reader thread (inbound) or the writing
/// thread (outbound) while the connection's fan-out lock is held, so it must
/// not call back into the same connection.
pub type SubscriberSink = Box<dyn FnMut(Direction, &[u8]) + Send>;

struct Subscriber {
    id: SubscriptionId,
    interest: Interest,
    limit: Option<usize>,
    sink: SubscriberSink,
}

impl Subscriber {
    fn deliver(&mut self, direction: Direction, line: &[u8]) {
        let bounded = match self.limit {
            Some(limit) => line.get(..limit).unwrap_or(line),
            None => line,
        };
        (self.sink)(direction, bounded);
    }
}

/// Fixed-capacity collection of subscribers.
pub(crate) struct SubscriberRegistry {
    capacity: usize,
    next_id: u64,
    entries: Vec<Subscriber>,
}

impl SubscriberRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: 0,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Registers a subscriber, or returns `None` when the registry is full.
    pub(crate) fn insert(
        &mut self,
        interest: Interest,
        limit: Option<usize>,
        sink: SubscriberSink,
    ) -> Option<SubscriptionId> {
        if self.entries.len() >= self.capacity {
            return None;
        }
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(Subscriber {
            id,
            interest,
            limit,
            sink,
        });
        Some(id)
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Delivers `line` to every subscriber interested in `direction`.
    ///
    /// A subscriber that panics is unregistered; the remaining subscribers
    /// and the calling thread carry on.
    pub(crate) fn dispatch(&mut self, direction: Direction, line: &[u8]) {
        self.entries.retain_mut(|entry| {
            if !entry.interest.matches(direction) {
                return true;
            }
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| entry.deliver(direction, line)));
            if delivered.is_err() {
                warn!(
                    target: CONNECTION_TARGET,
                    subscription = entry.id.0,
                    ?direction,
                    "subscriber panicked; unregistering it"
                );
            }
            delivered.is_ok()
        });
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SubscriberRegistry")
            .field("capacity", &self.capacity)
            .field("registered", &self.entries.len())
            .finish()
    }
}
