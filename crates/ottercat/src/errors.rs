//! Error types and exit-code mapping for the `ottercat` runtime.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use sockpush::{CommandError, ErrorKind, TransportError};
use thiserror::Error;

use crate::telemetry::TelemetryError;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONNECTION: u8 = 2;
const EXIT_PROTOCOL: u8 = 3;
const EXIT_TIMEOUT: u8 = 4;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to read commands from stdin: {0}")]
    ReadInput(io::Error),
    #[error("failed to open daemon socket: {0}")]
    Open(TransportError),
    #[error("daemon at {socket} did not accept a connection within {} ms", .waited.as_millis())]
    Unreachable { socket: Utf8PathBuf, waited: Duration },
    #[error("command failed: {0}")]
    Command(#[from] CommandError),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
}

impl AppError {
    /// Process exit status for this failure.
    pub(crate) fn exit_status(&self) -> u8 {
        let kind = match self {
            Self::Open(error) => error.kind(),
            Self::Unreachable { .. } => ErrorKind::Connection,
            Self::Command(error) => error.kind(),
            _ => return EXIT_FAILURE,
        };
        match kind {
            ErrorKind::Validation | ErrorKind::Connection => EXIT_CONNECTION,
            ErrorKind::Protocol => EXIT_PROTOCOL,
            ErrorKind::Timeout => EXIT_TIMEOUT,
            ErrorKind::Capacity | ErrorKind::Internal => EXIT_FAILURE,
        }
    }

    /// Code reported in the `err` field of the error record: the daemon's own
    /// code for rejected commands, otherwise the negated exit status.
    pub(crate) fn record_code(&self) -> i64 {
        match self {
            Self::Command(error) => error
                .protocol_code()
                .unwrap_or_else(|| -i64::from(self.exit_status())),
            _ => -i64::from(self.exit_status()),
        }
    }

    pub(crate) fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}
