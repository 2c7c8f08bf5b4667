//! Shared helpers for tradesight integration tests.
//!
//! - [`builders`]: config and alert-scenario builders.
//! - [`fake_backends`]: scriptable in-memory backends with call counters.

pub mod builders;
pub mod fake_backends;

use std::sync::{Arc, Once};

use tracing_subscriber::{EnvFilter, fmt};
use tradesight::Engine;
use tradesight::backends::Backends;
use tradesight::config::Settings;

use crate::fake_backends::ScriptedBackends;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=tradesight=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Engine wired to one scripted backend for every role.
pub fn engine_with(settings: Settings, backends: &Arc<ScriptedBackends>) -> Engine {
    Engine::new(settings, Backends::from_shared(Arc::clone(backends)))
        .expect("standard task graph must build")
}
