//! Test utilities for gsync
//!
//! In-memory stand-ins for the checkout provider and the manifest source,
//! plus one-time logging setup. Available to unit tests and, through the
//! `test-utils` feature, to integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use gsync_cli::test_utils::{FakeCheckout, MemoryManifestSource};
//!
//! let source = MemoryManifestSource::new()
//!     .with("src", "[deps]\n\"src/a\" = \"https://example.com/a.git\"\n");
//! let provider = FakeCheckout::new().touching("src/a", &["BUILD.gn"]);
//! ```

pub mod fake;

pub use fake::{FakeCheckout, MemoryManifestSource, SyncEvent};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, tests stay
/// silent.
///
/// ```bash
/// RUST_LOG=scheduler=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
