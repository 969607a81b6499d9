//! Error taxonomy for the socket transport and the command correlator.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification shared by every error this crate returns.
///
/// Front-ends map these onto distinct exit paths without matching on the
/// individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad socket path or arguments.
    Validation,
    /// The daemon could not be reached or the link dropped.
    Connection,
    /// The daemon acknowledged the command with a non-zero error code.
    Protocol,
    /// No matching response arrived within the global deadline.
    Timeout,
    /// Reader or subscriber slots are exhausted.
    Capacity,
    /// Thread lifecycle failure inside the transport.
    Internal,
}

/// Errors raised by [`Connection`](crate::Connection) and its handles.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket path does not exist.
    #[error("socket path {} does not exist", .path.display())]
    MissingPath {
        /// Path supplied by the caller.
        path: PathBuf,
    },
    /// The path exists but is not a socket.
    #[error("{} is not a socket", .path.display())]
    NotASocket {
        /// Path supplied by the caller.
        path: PathBuf,
    },
    /// Reading the path's metadata failed for a reason other than absence.
    #[error("failed to inspect socket path {}: {source}", .path.display())]
    Metadata {
        /// Path supplied by the caller.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Connecting to the daemon failed.
    #[error("failed to connect to daemon at {}: {source}", .path.display())]
    Connect {
        /// Socket path the connect targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A write was attempted while the connection is between connects.
    #[error("not connected to daemon at {}", .path.display())]
    NotConnected {
        /// Socket path of the connection.
        path: PathBuf,
    },
    /// Writing to the socket failed.
    #[error("failed to send to daemon: {source}")]
    Send {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Every reader slot on the connection is taken.
    #[error("reader capacity of {capacity} exhausted")]
    ReaderCapacity {
        /// Configured reader capacity.
        capacity: usize,
    },
    /// Every subscriber slot on the connection is taken.
    #[error("subscriber capacity of {capacity} exhausted")]
    SubscriberCapacity {
        /// Configured subscriber capacity.
        capacity: usize,
    },
    /// The connection was closed while the caller was waiting.
    #[error("connection closed")]
    Closed,
    /// The line reader thread could not be started.
    #[error("failed to spawn line reader thread: {source}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The line reader thread panicked.
    #[error("line reader thread panicked")]
    ThreadPanic,
}

impl TransportError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPath { .. } | Self::NotASocket { .. } | Self::Metadata { .. } => {
                ErrorKind::Validation
            }
            Self::Connect { .. } | Self::NotConnected { .. } | Self::Send { .. } | Self::Closed => {
                ErrorKind::Connection
            }
            Self::ReaderCapacity { .. } | Self::SubscriberCapacity { .. } => ErrorKind::Capacity,
            Self::Spawn { .. } | Self::ThreadPanic => ErrorKind::Internal,
        }
    }
}

/// Terminal failures of [`CommandCorrelator::execute`](crate::CommandCorrelator::execute).
#[derive(Debug, Error)]
pub enum CommandError {
    /// No reader handle could be created for the exchange.
    #[error("failed to create reader: {0}")]
    ReaderUnavailable(#[source] TransportError),
    /// The request could not be written to the daemon.
    #[error("failed to send command: {0}")]
    Send(#[source] TransportError),
    /// The daemon acknowledged the command with an error code.
    #[error("daemon rejected command with error code {code}")]
    Protocol {
        /// Error code reported by the daemon.
        code: i64,
    },
    /// No matching response arrived within the global deadline.
    #[error("no matching response within {} ms", .budget.as_millis())]
    Timeout {
        /// The global deadline that elapsed.
        budget: Duration,
    },
    /// The connection failed while waiting for a response.
    #[error("transport failed while waiting for response: {0}")]
    Transport(#[source] TransportError),
}

impl CommandError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ReaderUnavailable(source) | Self::Send(source) | Self::Transport(source) => {
                source.kind()
            }
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Daemon error code when the daemon rejected the command.
    #[must_use]
    pub const fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code } => Some(*code),
            _ => None,
        }
    }
}
