//! Request/response correlation on top of a [`Connection`].
//!
//! A command is answered in up to two steps: an acknowledgement carrying an
//! error code and a session id, then, for non-zero sessions, a status report
//! carrying the result. The correlator sends the request, waits for both,
//! re-sends when the daemon flags the status payload as incomplete, and gives
//! up once a single global deadline derived from the [`RetryPolicy`] elapses.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::connection::Connection;
use crate::envelope::Envelope;
use crate::reader::Reader;
use crate::{CORRELATOR_TARGET, CommandError, TransportError};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_MAX_RESULT_BYTES: usize = 1024;

/// Per-attempt timeout and attempt budget for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempt_timeout: Duration,
    attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_TIMEOUT, 1)
    }
}

impl RetryPolicy {
    /// Creates a policy. An attempt budget of zero is raised to one.
    #[must_use]
    pub const fn new(attempt_timeout: Duration, attempts: u32) -> Self {
        Self {
            attempt_timeout,
            attempts: if attempts == 0 { 1 } else { attempts },
        }
    }

    /// Longest single wait for a daemon line.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Number of attempts the global deadline is sized for.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Global deadline: every attempt's timeout plus half of one more.
    #[must_use]
    pub fn global_budget(&self) -> Duration {
        self.attempt_timeout
            .saturating_mul(self.attempts)
            .saturating_add(self.attempt_timeout / 2)
    }
}

/// Successful result of a correlated command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Status payload, or empty when the daemon answered with session zero.
    pub result: String,
    /// Whether `result` was cut short to fit the result capacity.
    pub truncated: bool,
}

/// Transport operations the correlator needs from a connection.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Exchange {
    fn send(&mut self, request: &[u8]) -> Result<(), TransportError>;

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

struct Session<'a> {
    connection: &'a Connection,
    reader: Reader,
}

impl Exchange for Session<'_> {
    fn send(&mut self, request: &[u8]) -> Result<(), TransportError> {
        self.connection.send_command(request).map(|_| ())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        self.reader.receive_line(timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitAck,
    AwaitStatus { session: i64 },
}

/// Sends commands and matches the daemon's replies to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCorrelator {
    policy: RetryPolicy,
    max_result_bytes: usize,
}

impl CommandCorrelator {
    /// Creates a correlator with the default result capacity of 1024 bytes.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    /// Sets the longest result returned before truncation.
    #[must_use]
    pub const fn with_max_result_bytes(mut self, max_result_bytes: usize) -> Self {
        self.max_result_bytes = max_result_bytes;
        self
    }

    /// The retry policy in force.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends `request` on `connection` and waits for its result.
    ///
    /// Only lines published after this call starts are considered. Lines
    /// that are not JSON, or that do not answer this command, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::ReaderUnavailable`] when no reader slot is
    /// free, [`CommandError::Send`] when a write fails,
    /// [`CommandError::Protocol`] when the daemon rejects the command,
    /// [`CommandError::Timeout`] once the global deadline elapses, and
    /// [`CommandError::Transport`] if the connection closes while waiting.
    pub fn execute(
        &self,
        connection: &Connection,
        request: &[u8],
    ) -> Result<CommandOutcome, CommandError> {
        let mut reader = connection
            .reader()
            .map_err(CommandError::ReaderUnavailable)?;
        reader.purge();
        let mut session = Session { connection, reader };
        self.run(&mut session, request)
    }

    pub(crate) fn run(
        &self,
        exchange: &mut impl Exchange,
        request: &[u8],
    ) -> Result<CommandOutcome, CommandError> {
        let budget = self.policy.global_budget();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        'send: loop {
            attempt += 1;
            debug!(
                target: CORRELATOR_TARGET,
                attempt,
                budget_ms = budget.as_millis(),
                "sending command"
            );
            exchange.send(request).map_err(CommandError::Send)?;
            let mut phase = Phase::AwaitAck;

            loop {
                let remaining = budget.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(CommandError::Timeout { budget });
                }
                let line = exchange
                    .receive(self.policy.attempt_timeout.min(remaining))
                    .map_err(CommandError::Transport)?;
                if started.elapsed() >= budget {
                    return Err(CommandError::Timeout { budget });
                }
                let Some(line) = line else {
                    continue;
                };

                match (phase, Envelope::decode(&line)) {
                    (Phase::AwaitAck, Envelope::Ack(ack)) => {
                        if ack.code != 0 {
                            return Err(CommandError::Protocol { code: ack.code });
                        }
                        if ack.session == 0 {
                            return Ok(CommandOutcome::default());
                        }
                        debug!(
                            target: CORRELATOR_TARGET,
                            session = ack.session,
                            "command acknowledged"
                        );
                        phase = Phase::AwaitStatus {
                            session: ack.session,
                        };
                    }
                    (Phase::AwaitStatus { session }, Envelope::Status(status))
                        if status.session == session =>
                    {
                        match status.payload {
                            Some(payload) if status.qualifier == 0 => {
                                return Ok(self.outcome(payload));
                            }
                            _ => {
                                debug!(
                                    target: CORRELATOR_TARGET,
                                    session,
                                    qualifier = status.qualifier,
                                    "incomplete status; resending command"
                                );
                                continue 'send;
                            }
                        }
                    }
                    _ => trace!(
                        target: CORRELATOR_TARGET,
                        line = %String::from_utf8_lossy(&line),
                        "ignoring unrelated daemon line"
                    ),
                }
            }
        }
    }

    fn outcome(&self, mut result: String) -> CommandOutcome {
        if result.len() <= self.max_result_bytes {
            return CommandOutcome {
                result,
                truncated: false,
            };
        }
        let mut end = self.max_result_bytes;
        while !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
        CommandOutcome {
            result,
            truncated: true,
        }
    }
}
