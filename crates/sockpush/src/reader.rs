//! Pull-style consumer handle.

use std::sync::Arc;
use std::time::Duration;

use crate::TransportError;
use crate::fanout::Fanout;

/// Pull consumer attached to a [`Connection`](crate::Connection).
///
/// A reader observes only lines published after it was created or last
/// purged. Each published line is returned at most once per reader, in
/// publication order.
///
/// The connection keeps a single line, not a backlog. The line reader loop
/// only waits for readers that are blocked in [`Reader::receive`] when a line
/// arrives. A reader that is busy elsewhere when several lines are published
/// gets only the newest one on its next receive; the ones in between are
/// skipped. To see every line, keep a receive outstanding or use a
/// subscriber. Dropping the reader releases its slot.
#[derive(Debug)]
pub struct Reader {
    fanout: Arc<Fanout>,
    last_seen: u64,
}

impl Reader {
    pub(crate) fn new(fanout: Arc<Fanout>) -> Result<Self, TransportError> {
        let last_seen = fanout.register_reader()?;
        Ok(Self { fanout, last_seen })
    }

    /// Discards any line published since the last receive.
    pub fn purge(&mut self) {
        self.last_seen = self.fanout.current_line_id();
    }

    /// Copies the next unseen line into `buf`.
    ///
    /// Lines longer than `buf` are truncated. Returns `Ok(Some(len))` with the
    /// number of bytes copied, `Ok(None)` when `timeout` elapses first, or
    /// [`TransportError::Closed`] once the connection has been closed. A zero
    /// timeout polls without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the connection is closed while
    /// no unseen line is buffered.
    pub fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<usize>, TransportError> {
        self.fanout
            .receive_with(&mut self.last_seen, timeout, |line| {
                let len = line.len().min(buf.len());
                if let (Some(target), Some(source)) = (buf.get_mut(..len), line.get(..len)) {
                    target.copy_from_slice(source);
                }
                len
            })
    }

    /// Returns the next unseen line as an owned buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the connection is closed while
    /// no unseen line is buffered.
    pub fn receive_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        self.fanout
            .receive_with(&mut self.last_seen, timeout, <[u8]>::to_vec)
    }

    /// Identifier of the last line this reader consumed or purged.
    #[must_use]
    pub const fn last_line_id(&self) -> u64 {
        self.last_seen
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.fanout.release_reader();
    }
}
