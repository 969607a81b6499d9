//! Connection handle: validation, writes, consumer registration and close.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::options::ConnectionOptions;
use crate::reader::Reader;
use crate::subscriber::{Direction, Interest, SubscriptionId};
use crate::worker::{self, Link};
use crate::{CONNECTION_TARGET, TransportError};

const TERMINATOR: u8 = b'\n';

/// Client side of a daemon's line-oriented Unix socket.
///
/// Opening a connection validates the path and starts a background line
/// reader thread that connects, reconnects with exponential backoff, and
/// publishes every inbound line to this connection's [`Reader`] handles and
/// subscribers. The handle is shared by reference between threads; writes
/// are serialised internally.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use sockpush::{Connection, ConnectionOptions};
///
/// # fn main() -> Result<(), sockpush::TransportError> {
/// let connection = Connection::open("/run/otter/otter.sock", ConnectionOptions::default())?;
/// let mut reader = connection.reader()?;
/// let _connected = connection.wait_connected(Duration::from_secs(1));
/// connection.send_command(br#"{"cmd":"version"}"#)?;
/// if let Some(line) = reader.receive_line(Duration::from_millis(500))? {
///     println!("{}", String::from_utf8_lossy(&line));
/// }
/// connection.close()
/// # }
/// ```
#[derive(Debug)]
pub struct Connection {
    link: Arc<Link>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Connection {
    /// Validates `path` and starts the line reader loop.
    ///
    /// The connect itself happens on the loop's thread, so a daemon that is
    /// not yet listening is not an error here; see
    /// [`Connection::wait_connected`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingPath`] or
    /// [`TransportError::NotASocket`] when the path is unusable, and
    /// [`TransportError::Spawn`] if the thread cannot be started.
    pub fn open(path: impl AsRef<Path>, options: ConnectionOptions) -> Result<Self, TransportError> {
        let path = path.as_ref();
        validate_socket_path(path)?;

        let link = Arc::new(Link::new(path.to_path_buf(), options));
        let worker_link = Arc::clone(&link);
        let worker = thread::Builder::new()
            .name(String::from("sockpush-reader"))
            .spawn(move || worker::run(&worker_link))
            .map_err(|source| TransportError::Spawn { source })?;

        debug!(
            target: CONNECTION_TARGET,
            path = %path.display(),
            "connection opened"
        );
        Ok(Self {
            link,
            worker: Some(worker),
        })
    }

    /// Socket path this connection targets.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.link.path
    }

    /// Options the connection was opened with.
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.link.options
    }

    /// Whether the line reader loop currently holds a live stream.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.writer.is_connected()
    }

    /// Blocks until connected or `timeout` elapses. Returns whether the
    /// connection is live.
    #[must_use]
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.link.writer.wait_connected(timeout)
    }

    /// Writes `bytes` verbatim and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] between connects and
    /// [`TransportError::Send`] when the write fails.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, TransportError> {
        self.write_frame(bytes)
    }

    /// Writes `bytes` as one request line, appending a newline unless the
    /// buffer already ends with one.
    ///
    /// # Errors
    ///
    /// As for [`Connection::write`].
    pub fn send_command(&self, bytes: &[u8]) -> Result<usize, TransportError> {
        if bytes.last() == Some(&TERMINATOR) {
            return self.write_frame(bytes);
        }
        let mut framed = Vec::with_capacity(bytes.len() + 1);
        framed.extend_from_slice(bytes);
        framed.push(TERMINATOR);
        self.write_frame(&framed)
    }

    fn write_frame(&self, frame: &[u8]) -> Result<usize, TransportError> {
        let written = self
            .link
            .writer
            .with_stream(|stream| stream.write_all(frame).and_then(|()| stream.flush()))
            .ok_or_else(|| TransportError::NotConnected {
                path: self.link.path.clone(),
            })?;
        written.map_err(|source: io::Error| TransportError::Send { source })?;
        self.link.fanout.dispatch_outbound(frame);
        Ok(frame.len())
    }

    /// Creates a pull consumer that sees lines published from now on.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ReaderCapacity`] when every reader slot is
    /// taken.
    pub fn reader(&self) -> Result<Reader, TransportError> {
        Reader::new(Arc::clone(&self.link.fanout))
    }

    /// Registers a push consumer.
    ///
    /// `sink` runs synchronously for every line matching `interest`, on the
    /// thread that moved the line, and receives at most `limit` bytes of it
    /// when a limit is given. It must not call back into this connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SubscriberCapacity`] when every subscriber
    /// slot is taken.
    pub fn subscribe<F>(
        &self,
        interest: Interest,
        limit: Option<usize>,
        sink: F,
    ) -> Result<SubscriptionId, TransportError>
    where
        F: FnMut(Direction, &[u8]) + Send + 'static,
    {
        self.link.fanout.subscribe(interest, limit, Box::new(sink))
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.link.fanout.unsubscribe(id)
    }

    /// Stops the line reader loop, waits for it to exit and releases the
    /// socket. Blocked readers return [`TransportError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ThreadPanic`] if the loop panicked.
    pub fn close(mut self) -> Result<(), TransportError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), TransportError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.link.fanout.close();
        self.link.stop.raise();
        self.link.writer.shut();
        let joined = worker.join().map_err(|_| TransportError::ThreadPanic);
        debug!(
            target: CONNECTION_TARGET,
            path = %self.link.path.display(),
            "connection closed"
        );
        joined
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(
                target: CONNECTION_TARGET,
                error = %error,
                "line reader loop ended abnormally"
            );
        }
    }
}

fn validate_socket_path(path: &Path) -> Result<(), TransportError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(TransportError::MissingPath {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(TransportError::Metadata {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if metadata.file_type().is_socket() {
        Ok(())
    } else {
        Err(TransportError::NotASocket {
            path: PathBuf::from(path),
        })
    }
}
