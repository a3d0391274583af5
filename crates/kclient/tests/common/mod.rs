//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use kclient::Client;
use kclient::mock::MockServer;

pub const SHORT: Duration = Duration::from_millis(100);
pub const LONG: Duration = Duration::from_secs(5);

/// Routes `RUST_LOG`-filtered tracing output to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn connect(server: &MockServer) -> Client {
    init_tracing();
    server.connect("test-client").await.expect("connect to mock server")
}
