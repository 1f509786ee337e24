//! Log output for tests.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
///
/// Engine events are kept at debug level so failed request attempts show up next to a failing
/// assertion. HTTP internals stay quiet unless they warn.
pub const DEFAULT_FILTER: &str = "warn,goben=debug,goben_test=debug";

/// Installs a subscriber that writes through the test harness.
///
/// Output is captured per test and only shown for failing tests (or with `--nocapture`). Set
/// `RUST_LOG` to override [`DEFAULT_FILTER`]. Safe to call from every test; only the first call
/// in a process installs anything.
///
/// ```
/// goben_test::tracing::init();
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .try_init();
}
