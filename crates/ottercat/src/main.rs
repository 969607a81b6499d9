//! Entrypoint for `ottercat`, a one-shot command client for the otter daemon.
//!
//! The binary delegates to [`ottercat::run`], which loads configuration,
//! connects to the daemon socket and streams the requested commands.

use std::io::{self, StderrLock, StdinLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdin: StdinLock<'_> = io::stdin().lock();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    ottercat::run(std::env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}
