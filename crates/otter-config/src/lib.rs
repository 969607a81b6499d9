//! Shared configuration for the otter socket client.
//!
//! Configuration is layered by `ortho_config`: command-line flags win over
//! `OTTER_*` environment variables, which win over a configuration file, which
//! wins over the built-in defaults in [`defaults`]. Every field is optional so
//! that each layer only contributes what it sets; accessors on [`Config`]
//! resolve the final value.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use sockpush::{ConnectionOptions, RetryPolicy};

pub mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_MIN_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_LINE_BYTES,
    DEFAULT_MAX_READERS, DEFAULT_MAX_SUBSCRIBERS, DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS,
    default_log_filter, default_log_format, default_socket_path,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Layered configuration consumed by the `ottercat` front-end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "OTTER")]
pub struct Config {
    /// Filesystem path of the daemon's Unix domain socket.
    pub socket: Option<Utf8PathBuf>,
    /// Milliseconds to wait for each response attempt.
    pub timeout_ms: Option<u64>,
    /// Additional attempts after the first.
    pub retries: Option<u32>,
    /// Maximum number of concurrent reader handles per connection.
    pub max_readers: Option<usize>,
    /// Maximum number of push subscribers per connection.
    pub max_subscribers: Option<usize>,
    /// Longest inbound line accepted, in bytes.
    pub max_line_bytes: Option<usize>,
    /// First reconnect delay in milliseconds.
    pub backoff_min_ms: Option<u64>,
    /// Reconnect delay ceiling in milliseconds.
    pub backoff_max_ms: Option<u64>,
    /// `tracing` filter expression.
    pub log_filter: Option<String>,
    /// Output format for log records.
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Resolved daemon socket path.
    #[must_use]
    pub fn socket_path(&self) -> Utf8PathBuf {
        self.socket.clone().unwrap_or_else(default_socket_path)
    }

    /// Resolved per-attempt timeout.
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    /// Number of attempts the correlator may spend on one command.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.retries
            .unwrap_or(DEFAULT_RETRIES)
            .saturating_add(1)
    }

    /// Retry policy derived from the timeout and retry settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempt_timeout(), self.attempts())
    }

    /// Connection options derived from the capacity and backoff settings.
    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::default()
            .with_max_readers(self.max_readers.unwrap_or(DEFAULT_MAX_READERS))
            .with_max_subscribers(self.max_subscribers.unwrap_or(DEFAULT_MAX_SUBSCRIBERS))
            .with_max_line_bytes(self.max_line_bytes.unwrap_or(DEFAULT_MAX_LINE_BYTES))
            .with_backoff(
                Duration::from_millis(self.backoff_min_ms.unwrap_or(DEFAULT_BACKOFF_MIN_MS)),
                Duration::from_millis(self.backoff_max_ms.unwrap_or(DEFAULT_BACKOFF_MAX_MS)),
            )
    }

    /// Resolved log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Resolved log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Returns a copy of the configuration pointing at another socket.
    #[must_use]
    pub fn with_socket(mut self, path: impl AsRef<Utf8Path>) -> Self {
        self.socket = Some(path.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::default();
        assert_eq!(config.attempt_timeout(), Duration::from_millis(500));
        assert_eq!(config.attempts(), 1);
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Compact);
    }

    #[test]
    fn retry_policy_counts_first_attempt() {
        let config = Config {
            timeout_ms: Some(200),
            retries: Some(2),
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.global_budget(), Duration::from_millis(700));
    }

    #[test]
    fn connection_options_follow_configuration() {
        let config = Config {
            max_readers: Some(2),
            max_line_bytes: Some(64),
            backoff_min_ms: Some(10),
            backoff_max_ms: Some(40),
            ..Config::default()
        };
        let options = config.connection_options();
        assert_eq!(options.max_readers(), 2);
        assert_eq!(options.max_subscribers(), DEFAULT_MAX_SUBSCRIBERS);
        assert_eq!(options.max_line_bytes(), 64);
        assert_eq!(options.backoff_min(), Duration::from_millis(10));
        assert_eq!(options.backoff_max(), Duration::from_millis(40));
    }

    #[test]
    fn explicit_socket_overrides_default() {
        let config = Config::default().with_socket("/run/otter/test.sock");
        assert_eq!(config.socket_path(), Utf8PathBuf::from("/run/otter/test.sock"));
    }
}
