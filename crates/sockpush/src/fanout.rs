//! Single-slot line buffer shared between the line reader loop and its
//! consumers.
//!
//! The producer publishes each completed line in three steps under one lock:
//! it replaces the slot and bumps the line id, delivers the line to matching
//! subscribers, and, only when readers are blocked in [`Fanout::receive_with`],
//! broadcasts `line_ready` and waits on `read_done` until every one of those
//! readers has copied the slot out. Readers that start waiting after the
//! broadcast are not counted, so they cannot hold the producer back. When no
//! reader is blocked the producer pays no synchronisation cost beyond the lock.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::TransportError;
use crate::options::ConnectionOptions;
use crate::subscriber::{Direction, Interest, SubscriberRegistry, SubscriberSink, SubscriptionId};

#[derive(Debug)]
struct LineState {
    line: Vec<u8>,
    line_id: u64,
    /// Readers currently blocked waiting for a new line.
    waiting: usize,
    /// Blocked readers the in-flight broadcast still waits on.
    pending: usize,
    readers: usize,
    max_readers: usize,
    subscribers: SubscriberRegistry,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct Fanout {
    state: Mutex<LineState>,
    line_ready: Condvar,
    read_done: Condvar,
}

impl Fanout {
    pub(crate) fn new(options: &ConnectionOptions) -> Self {
        Self {
            state: Mutex::new(LineState {
                line: Vec::with_capacity(options.max_line_bytes()),
                line_id: 0,
                waiting: 0,
                pending: 0,
                readers: 0,
                max_readers: options.max_readers(),
                subscribers: SubscriberRegistry::new(options.max_subscribers()),
                closed: false,
            }),
            line_ready: Condvar::new(),
            read_done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LineState> {
        // Recover from a consumer that panicked while holding the lock.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes a completed line and runs the fan-out handshake.
    pub(crate) fn publish(&self, line: &[u8]) -> u64 {
        let mut state = self.lock();
        state.line.clear();
        state.line.extend_from_slice(line);
        state.line_id += 1;
        let line_id = state.line_id;

        let LineState {
            line: current,
            subscribers,
            ..
        } = &mut *state;
        subscribers.dispatch(Direction::Inbound, current);

        if state.waiting == 0 || state.closed {
            return line_id;
        }

        state.pending = state.waiting;
        self.line_ready.notify_all();
        while state.pending > 0 && !state.closed {
            state = self
                .read_done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        line_id
    }

    /// Delivers bytes written to the daemon to outbound subscribers.
    pub(crate) fn dispatch_outbound(&self, bytes: &[u8]) {
        self.lock()
            .subscribers
            .dispatch(Direction::Outbound, bytes);
    }

    pub(crate) fn subscribe(
        &self,
        interest: Interest,
        limit: Option<usize>,
        sink: SubscriberSink,
    ) -> Result<SubscriptionId, TransportError> {
        let mut state = self.lock();
        let capacity = state.subscribers.capacity();
        state
            .subscribers
            .insert(interest, limit, sink)
            .ok_or(TransportError::SubscriberCapacity { capacity })
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.remove(id)
    }

    /// Claims a reader slot and returns the id of the current line.
    pub(crate) fn register_reader(&self) -> Result<u64, TransportError> {
        let mut state = self.lock();
        if state.readers >= state.max_readers {
            return Err(TransportError::ReaderCapacity {
                capacity: state.max_readers,
            });
        }
        state.readers += 1;
        Ok(state.line_id)
    }

    pub(crate) fn release_reader(&self) {
        let mut state = self.lock();
        state.readers = state.readers.saturating_sub(1);
    }

    pub(crate) fn current_line_id(&self) -> u64 {
        self.lock().line_id
    }

    /// Waits for a line newer than `last_seen` and hands it to `copy`.
    ///
    /// Returns `Ok(None)` once `timeout` elapses without a new line and
    /// [`TransportError::Closed`] if the connection closes first.
    pub(crate) fn receive_with<T>(
        &self,
        last_seen: &mut u64,
        timeout: Duration,
        copy: impl FnOnce(&[u8]) -> T,
    ) -> Result<Option<T>, TransportError> {
        let mut state = self.lock();
        if state.line_id != *last_seen {
            *last_seen = state.line_id;
            return Ok(Some(copy(&state.line)));
        }
        if state.closed {
            return Err(TransportError::Closed);
        }

        let deadline = Instant::now().checked_add(timeout);
        let registered_at = state.line_id;
        state.waiting += 1;
        let outcome = loop {
            if state.line_id != *last_seen {
                *last_seen = state.line_id;
                break Ok(Some(copy(&state.line)));
            }
            if state.closed {
                break Err(TransportError::Closed);
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                break Ok(None);
            }
            state = self
                .line_ready
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        };

        state.waiting -= 1;
        // A line published since registration counted this reader in its
        // broadcast; acknowledge it whether the line was copied or not.
        if state.line_id != registered_at && state.pending > 0 {
            state.pending -= 1;
            if state.pending == 0 {
                self.read_done.notify_all();
            }
        }
        outcome
    }

    /// Marks the buffer closed and wakes every blocked party.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.pending = 0;
        self.line_ready.notify_all();
        self.read_done.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.lock().waiting
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.lock().pending
    }
}
