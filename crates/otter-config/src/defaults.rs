use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

/// Per-attempt response timeout used when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Extra attempts made after the first one when none are configured.
pub const DEFAULT_RETRIES: u32 = 0;

/// Reader handles a single connection admits by default.
pub const DEFAULT_MAX_READERS: usize = 4;

/// Push subscribers a single connection admits by default.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 4;

/// Longest inbound line, in bytes, accepted by the line reader loop.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024;

/// First reconnect delay after a failed connect.
pub const DEFAULT_BACKOFF_MIN_MS: u64 = 1_000;

/// Upper bound for the doubling reconnect delay.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// File name of the daemon socket inside the runtime directory.
const SOCKET_FILE_NAME: &str = "otter.sock";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Computes the default daemon socket path.
///
/// Prefers `$XDG_RUNTIME_DIR/otter/otter.sock`; without a runtime directory
/// the path falls back to a per-user namespace under the temporary directory.
#[must_use]
pub fn default_socket_path() -> Utf8PathBuf {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("otter");
    if apply_namespace {
        base.push(user_namespace());
    }

    base.join(SOCKET_FILE_NAME)
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(not(unix))]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    None
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn user_namespace() -> String {
    String::from("shared")
}
