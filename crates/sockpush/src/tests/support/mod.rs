//! Shared helpers for transport tests.

mod fake_daemon;

pub(in crate::tests) use fake_daemon::{FakeDaemon, Responder};

use std::time::{Duration, Instant};

/// Polls `condition` until it holds or `timeout` elapses.
pub(in crate::tests) fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
