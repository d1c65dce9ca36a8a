//! Tracing initialization for binaries and tests.

use std::sync::Once;

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Guard ensuring the test subscriber is installed at most once per process.
static TEST_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber for a binary.
///
/// The log level is controlled through `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("tracing initialized");
}

/// Initializes tracing for tests.
///
/// Safe to call from every test; the subscriber is installed only once and
/// writes to the test-captured output.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .init();
    });
}
