//! Client transport for daemons that speak newline-delimited JSON over a
//! Unix domain socket.
//!
//! A [`Connection`] owns one background line reader thread. The thread
//! connects (and reconnects, with exponential backoff), splits the inbound
//! byte stream into lines and publishes each line to two kinds of consumer:
//!
//! - [`Reader`] handles pull lines with a timeout. A line is handed to every
//!   reader blocked at the moment it arrives, and the reader thread does not
//!   overwrite it until each of them has copied it out.
//! - Subscribers registered with [`Connection::subscribe`] are called
//!   synchronously for every line, in either direction, before any reader is
//!   woken.
//!
//! [`CommandCorrelator`] builds request/response semantics on top: it sends a
//! command, waits for the daemon's acknowledgement and, when the daemon opens
//! a session, for the matching status report, re-sending on incomplete
//! reports until a single global deadline expires.

mod backoff;
mod connection;
mod correlator;
mod envelope;
mod error;
mod fanout;
mod line;
mod options;
mod reader;
mod subscriber;
mod worker;

pub use connection::Connection;
pub use correlator::{CommandCorrelator, CommandOutcome, RetryPolicy};
pub use error::{CommandError, ErrorKind, TransportError};
pub use options::ConnectionOptions;
pub use reader::Reader;
pub use subscriber::{Direction, Interest, SubscriberSink, SubscriptionId};

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");
const CORRELATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::correlator");

#[cfg(test)]
mod tests;
