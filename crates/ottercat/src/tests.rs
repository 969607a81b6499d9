//! Runner tests against an in-process daemon.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use camino::Utf8PathBuf;
use otter_config::Config;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::config::ConfigLoader;
use crate::{AppError, run_with_loader};

struct StaticConfigLoader(Config);

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.0.clone())
    }
}

/// Serves one client, answering each request from a fixed table.
struct Daemon {
    _dir: TempDir,
    socket: PathBuf,
}

impl Daemon {
    fn spawn(replies: &'static [(&'static str, &'static [&'static str])]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("otter.sock");
        let listener = UnixListener::bind(&socket).expect("bind daemon");
        thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut writer = stream.try_clone().expect("clone stream");
            for request in BufReader::new(stream).lines() {
                let Ok(request) = request else { return };
                let answer = replies
                    .iter()
                    .find(|(name, _)| *name == request)
                    .map_or(&[][..], |(_, lines)| *lines);
                for line in answer {
                    if writeln!(writer, "{line}").is_err() {
                        return;
                    }
                }
            }
        });
        Self { _dir: dir, socket }
    }

    fn config(&self) -> Config {
        Config {
            timeout_ms: Some(100),
            log_filter: Some(String::from("off")),
            ..Config::default()
        }
        .with_socket(Utf8PathBuf::from_path_buf(self.socket.clone()).expect("utf-8 socket path"))
    }
}

const REPLIES: &[(&str, &[&str])] = &[
    ("ping", &[r#"{"type":"ack","data":{"cmd":"ping","err":0,"sid":0}}"#]),
    (
        "rx",
        &[
            r#"{"type":"ack","data":{"cmd":"rx","err":0,"sid":3}}"#,
            r#"{"type":"rxstat","data":{"sid":3,"qual":0,"frame":"AB12"}}"#,
        ],
    ),
    ("bad", &[r#"{"type":"ack","data":{"cmd":"bad","err":7,"sid":0}}"#]),
];

struct Run {
    code: ExitCode,
    stdout: String,
    stderr: String,
}

fn run(config: Config, args: &[&str], stdin: &str) -> Run {
    let mut input = stdin.as_bytes();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let args = std::iter::once("ottercat")
        .chain(args.iter().copied())
        .map(OsString::from);
    let code = run_with_loader(
        args,
        &mut input,
        &mut stdout,
        &mut stderr,
        &StaticConfigLoader(config),
    );
    Run {
        code,
        stdout: String::from_utf8(stdout).expect("utf-8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf-8 stderr"),
    }
}

#[fixture]
fn daemon() -> Daemon {
    Daemon::spawn(REPLIES)
}

#[rstest]
fn status_result_is_printed(daemon: Daemon) {
    let outcome = run(daemon.config(), &["rx"], "");
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert_eq!(outcome.stdout, "AB12\n");
}

#[rstest]
fn stdin_stream_runs_each_line(daemon: Daemon) {
    let outcome = run(
        daemon.config(),
        &[],
        "  ping\n\n{\"type\":\"dev\",\"data\":\"rx\"}\n",
    );
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert_eq!(outcome.stdout, "{\"type\":\"dev\",\"data\":\"AB12\"}\n");
}

#[rstest]
fn stream_stops_at_first_failure(daemon: Daemon) {
    let outcome = run(daemon.config(), &[], "bad\nrx\n");
    assert_eq!(outcome.code, ExitCode::from(3));
    assert_eq!(
        outcome.stdout,
        "{\"cmd\":\"ottercat\",\"err\":7,\"desc\":\"command failed: daemon rejected command with error code 7\"}\n"
    );
    assert!(outcome.stderr.contains("error code 7"));
}

#[rstest]
fn silent_daemon_times_out(daemon: Daemon) {
    let outcome = run(daemon.config(), &["unknown"], "");
    assert_eq!(outcome.code, ExitCode::from(4));
    assert!(outcome.stdout.contains("\"err\":-4"));
}

#[rstest]
fn missing_socket_is_a_connection_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::default().with_socket(
        Utf8PathBuf::from_path_buf(dir.path().join("absent.sock")).expect("utf-8 path"),
    );
    let outcome = run(config, &["ping"], "");
    assert_eq!(outcome.code, ExitCode::from(2));
    assert!(outcome.stderr.contains("does not exist"));
}

#[rstest]
fn empty_input_exits_cleanly() {
    let outcome = run(Config::default(), &[], " \n\n");
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert!(outcome.stdout.is_empty());
}
