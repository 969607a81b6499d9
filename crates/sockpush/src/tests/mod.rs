//! Transport and correlator suites that need a live socket.

mod support;
