//! Runtime for `ottercat`, a one-shot command client for the otter daemon.
//!
//! The runner loads layered configuration, installs telemetry, opens a
//! [`sockpush::Connection`] to the daemon socket and executes each command
//! line through a [`sockpush::CommandCorrelator`]. Results go to stdout; a
//! failing command stops the stream, prints an error record and selects the
//! process exit code:
//!
//! | exit | meaning                                  |
//! |------|------------------------------------------|
//! | 0    | every command succeeded                  |
//! | 1    | usage, configuration or internal failure |
//! | 2    | socket path invalid or daemon unreachable |
//! | 3    | daemon rejected a command                |
//! | 4    | no response within the deadline          |

use std::ffi::OsString;
use std::io::{Read, Write};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use otter_config::Config;
use sockpush::{CommandCorrelator, Connection};
use tracing::{debug, warn};

mod command;
mod config;
mod errors;
mod telemetry;

use command::{CommandLine, command_lines, error_record};
use config::{ConfigArgumentSplit, ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub(crate) use errors::AppError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

/// Sends commands to the otter daemon and prints their results.
///
/// Configuration flags (`--socket`, `--timeout-ms`, `--retries`, ...) must
/// precede the command. Without a command, commands are read from stdin,
/// one per line.
#[derive(Parser, Debug)]
#[command(name = "ottercat", version)]
struct Cli {
    /// Command sent to the daemon; the words are joined with spaces.
    #[arg(
        value_name = "CMD",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

struct IoStreams<'a, R: Read, W: Write, E: Write> {
    stdin: &'a mut R,
    stdout: &'a mut W,
    stderr: &'a mut E,
}

struct CliRunner<'a, R: Read, W: Write, E: Write, L: ConfigLoader> {
    io: IoStreams<'a, R, W, E>,
    loader: &'a L,
}

impl<R, W, E, L> CliRunner<'_, R, W, E, L>
where
    R: Read,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    fn run(&mut self, args: Vec<OsString>) -> ExitCode {
        match self.try_run(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(AppError::CliUsage(error))
                if matches!(
                    error.kind(),
                    ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion
                ) =>
            {
                if write!(self.io.stdout, "{error}").is_err() {
                    return ExitCode::FAILURE;
                }
                ExitCode::SUCCESS
            }
            Err(error) => {
                if writeln!(self.io.stderr, "ottercat: {error}").is_err() {
                    warn!(target: CLI_TARGET, error = %error, "failed to report error");
                }
                error.exit_code()
            }
        }
    }

    fn try_run(&mut self, args: &[OsString]) -> Result<(), AppError> {
        let split = split_config_arguments(args);
        let cli = Cli::try_parse_from(cli_arguments(args, &split)).map_err(AppError::CliUsage)?;
        let config = self.loader.load(&split.config_arguments)?;
        telemetry::initialise(&config)?;

        let stream = if cli.command.is_empty() {
            let mut buffer = String::new();
            self.io
                .stdin
                .read_to_string(&mut buffer)
                .map_err(AppError::ReadInput)?;
            buffer
        } else {
            cli.command.join(" ")
        };
        if command_lines(&stream).next().is_none() {
            debug!(target: CLI_TARGET, "no commands supplied");
            return Ok(());
        }

        let connection = open_connection(&config)?;
        let outcome = self.execute_stream(&config, &connection, &stream);
        if let Err(error) = connection.close() {
            warn!(target: CLI_TARGET, error = %error, "connection did not close cleanly");
        }
        outcome
    }

    fn execute_stream(
        &mut self,
        config: &Config,
        connection: &Connection,
        stream: &str,
    ) -> Result<(), AppError> {
        let correlator = CommandCorrelator::new(config.retry_policy())
            .with_max_result_bytes(config.connection_options().max_line_bytes());
        for line in command_lines(stream) {
            let command = CommandLine::parse(line);
            let Some(request) = command.request() else {
                debug!(target: CLI_TARGET, line, "skipping malformed envelope");
                continue;
            };
            match correlator.execute(connection, request) {
                Ok(outcome) => {
                    if outcome.truncated {
                        warn!(target: CLI_TARGET, line, "daemon result truncated");
                    }
                    if let Some(rendered) = command.render(&outcome.result) {
                        writeln!(self.io.stdout, "{rendered}").map_err(AppError::WriteOutput)?;
                    }
                }
                Err(error) => {
                    let error = AppError::from(error);
                    writeln!(
                        self.io.stdout,
                        "{}",
                        error_record(error.record_code(), &error.to_string())
                    )
                    .map_err(AppError::WriteOutput)?;
                    return Err(error);
                }
            }
        }
        Ok(())
    }
}

fn cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut arguments: Vec<OsString> = args.first().cloned().into_iter().collect();
    arguments.extend(args.iter().skip(split.command_start).cloned());
    arguments
}

fn open_connection(config: &Config) -> Result<Connection, AppError> {
    let socket = config.socket_path();
    let connection =
        Connection::open(&socket, config.connection_options()).map_err(AppError::Open)?;
    let waited = config.retry_policy().global_budget();
    if connection.wait_connected(waited) {
        Ok(connection)
    } else {
        if let Err(error) = connection.close() {
            warn!(target: CLI_TARGET, error = %error, "connection did not close cleanly");
        }
        Err(AppError::Unreachable { socket, waited })
    }
}

/// Runs `ottercat` with the given arguments and standard streams.
#[must_use]
pub fn run<I, R, W, E>(args: I, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdin, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, R, W, E, L>(
    args: I,
    stdin: &mut R,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let mut runner = CliRunner {
        io: IoStreams {
            stdin,
            stdout,
            stderr,
        },
        loader,
    };
    runner.run(args.into_iter().collect())
}

#[cfg(test)]
mod tests;
