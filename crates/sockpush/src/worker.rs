//! Line reader loop and the state it shares with its [`Connection`].
//!
//! The loop owns the connect phase as well as the read phase: it connects
//! with exponential backoff, publishes every completed line through the
//! fan-out, and on end-of-stream or a read error drops the stream and
//! reconnects. It only exits once the owning connection raises the stop
//! signal.
//!
//! [`Connection`]: crate::Connection

use std::io::{self, BufReader, Read};
use std::net::Shutdown;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, info, warn};

use crate::CONNECTION_TARGET;
use crate::backoff::Backoff;
use crate::fanout::Fanout;
use crate::line::LineAssembler;
use crate::options::ConnectionOptions;

/// State shared between a connection handle and its line reader loop.
#[derive(Debug)]
pub(crate) struct Link {
    pub(crate) path: PathBuf,
    pub(crate) options: ConnectionOptions,
    pub(crate) fanout: Arc<Fanout>,
    pub(crate) writer: WriterSlot,
    pub(crate) stop: StopSignal,
}

impl Link {
    pub(crate) fn new(path: PathBuf, options: ConnectionOptions) -> Self {
        Self {
            path,
            fanout: Arc::new(Fanout::new(&options)),
            options,
            writer: WriterSlot::default(),
            stop: StopSignal::default(),
        }
    }
}

/// Interruptible stop flag; backoff sleeps wake as soon as it is raised.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    raised: Mutex<bool>,
    changed: Condvar,
}

impl StopSignal {
    pub(crate) fn raise(&self) {
        *self.lock() = true;
        self.changed.notify_all();
    }

    pub(crate) fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Sleeps for `delay` or until raised. Returns whether it was raised.
    pub(crate) fn sleep(&self, delay: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, delay, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct WriterState {
    stream: Option<UnixStream>,
    shut: bool,
}

/// Write half of the current stream, present only while connected.
///
/// Writes hold the slot lock for their whole duration, so concurrent
/// requests never interleave on the wire.
#[derive(Debug, Default)]
pub(crate) struct WriterSlot {
    state: Mutex<WriterState>,
    connected: Condvar,
}

impl WriterSlot {
    /// Installs the write half of a fresh stream. Returns `false` once the
    /// slot has been shut, in which case the stream is dropped.
    fn install(&self, stream: UnixStream) -> bool {
        let mut state = self.lock();
        if state.shut {
            return false;
        }
        state.stream = Some(stream);
        self.connected.notify_all();
        true
    }

    fn clear(&self) {
        self.lock().stream = None;
    }

    /// Shuts the current stream down in both directions, unblocking the
    /// loop's pending read, and refuses any later install.
    pub(crate) fn shut(&self) {
        let mut state = self.lock();
        state.shut = true;
        if let Some(stream) = state.stream.take()
            && let Err(error) = stream.shutdown(Shutdown::Both)
        {
            debug!(
                target: CONNECTION_TARGET,
                error = %error,
                "socket shutdown failed"
            );
        }
        self.connected.notify_all();
    }

    /// Runs `write` against the current stream, or returns `None` when
    /// disconnected.
    pub(crate) fn with_stream<T>(&self, write: impl FnOnce(&mut UnixStream) -> T) -> Option<T> {
        self.lock().stream.as_mut().map(write)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.lock().stream.is_some()
    }

    pub(crate) fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        while state.stream.is_none() && !state.shut {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                break;
            }
            state = self
                .connected
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.stream.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Body of the line reader thread.
pub(crate) fn run(link: &Link) {
    let mut backoff = Backoff::new(link.options.backoff_min(), link.options.backoff_max());
    let mut assembler = LineAssembler::new(link.options.max_line_bytes());

    while !link.stop.is_raised() {
        let (reader, writer) = match connect(&link.path, link.options.connect_timeout()) {
            Ok(halves) => halves,
            Err(error) => {
                let delay = backoff.next_delay();
                warn!(
                    target: CONNECTION_TARGET,
                    path = %link.path.display(),
                    error = %error,
                    retry_in_ms = delay.as_millis(),
                    "failed to connect to daemon"
                );
                if link.stop.sleep(delay) {
                    break;
                }
                continue;
            }
        };
        backoff.reset();
        if !link.writer.install(writer) {
            break;
        }
        info!(
            target: CONNECTION_TARGET,
            path = %link.path.display(),
            "connected to daemon"
        );

        read_lines(link, reader, &mut assembler);
        link.writer.clear();
        assembler.reset();

        if link.stop.is_raised() {
            break;
        }
        info!(
            target: CONNECTION_TARGET,
            path = %link.path.display(),
            "daemon connection lost; reconnecting"
        );
    }

    link.writer.clear();
    debug!(target: CONNECTION_TARGET, "line reader loop stopped");
}

fn connect(path: &Path, timeout: Duration) -> io::Result<(UnixStream, UnixStream)> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream = UnixStream::from(OwnedFd::from(socket));
    let writer = stream.try_clone()?;
    Ok((stream, writer))
}

fn read_lines(link: &Link, stream: UnixStream, assembler: &mut LineAssembler) {
    for byte in BufReader::new(stream).bytes() {
        let byte = match byte {
            Ok(value) => value,
            Err(error) => {
                debug!(
                    target: CONNECTION_TARGET,
                    error = %error,
                    "daemon read failed"
                );
                return;
            }
        };
        match assembler.push(byte) {
            Ok(Some(line)) if !line.is_empty() => {
                link.fanout.publish(line);
            }
            Ok(_) => {}
            Err(overflow) => warn!(
                target: CONNECTION_TARGET,
                capacity = overflow.capacity,
                "dropping oversize line from daemon"
            ),
        }
    }
    debug!(target: CONNECTION_TARGET, "daemon closed the stream");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use rstest::rstest;

    #[rstest]
    fn stop_signal_interrupts_sleep() {
        let signal = Arc::new(StopSignal::default());
        let sleeper = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.sleep(Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.raise();
        assert!(sleeper.join().expect("sleeper thread"));
    }

    #[rstest]
    fn stop_signal_sleep_elapses_when_not_raised() {
        let signal = StopSignal::default();
        assert!(!signal.sleep(Duration::from_millis(10)));
    }

    #[rstest]
    fn shut_slot_refuses_install() {
        let slot = WriterSlot::default();
        slot.shut();
        let (left, _right) = UnixStream::pair().expect("socket pair");
        assert!(!slot.install(left));
        assert!(!slot.is_connected());
        assert!(!slot.wait_connected(Duration::from_millis(10)));
    }

    #[rstest]
    fn wait_connected_observes_install() {
        let slot = Arc::new(WriterSlot::default());
        let waiter = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.wait_connected(Duration::from_secs(5)))
        };
        let (left, _right) = UnixStream::pair().expect("socket pair");
        assert!(slot.install(left));
        assert!(waiter.join().expect("waiter thread"));
    }
}
