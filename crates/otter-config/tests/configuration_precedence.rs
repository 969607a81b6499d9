//! Precedence checks for layered configuration loading.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use ortho_config::OrthoConfig;
use otter_config::Config;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on edition 2024; the override is
        // undone in `Drop` while the mutex is still held.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

fn args(extra: &[&str]) -> Vec<OsString> {
    let mut arguments = vec![OsString::from("ottercat")];
    arguments.extend(extra.iter().map(OsString::from));
    arguments
}

#[rstest]
fn cli_flag_overrides_environment() {
    let _env = EnvOverride::set_var("OTTER_TIMEOUT_MS", OsStr::new("900"));
    let config = Config::load_from_iter(args(&["--timeout-ms", "250"])).expect("load config");
    assert_eq!(config.attempt_timeout(), Duration::from_millis(250));
}

#[rstest]
fn environment_applies_without_flag() {
    let _env = EnvOverride::set_var("OTTER_RETRIES", OsStr::new("2"));
    let config = Config::load_from_iter(args(&[])).expect("load config");
    assert_eq!(config.attempts(), 3);
}

#[rstest]
fn configuration_file_supplies_socket(temp_dir: TempDir) {
    let path = temp_dir.path().join("otter.toml");
    fs::write(&path, "socket = \"/run/otter/daemon.sock\"\nmax_readers = 2\n")
        .expect("write config file");
    let path_text = path.to_str().expect("utf8 config path");

    let config =
        Config::load_from_iter(args(&["--config-path", path_text])).expect("load config");
    assert_eq!(config.socket_path().as_str(), "/run/otter/daemon.sock");
    assert_eq!(config.connection_options().max_readers(), 2);
}
