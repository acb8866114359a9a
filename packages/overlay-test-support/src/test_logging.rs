//! Test logging for the overlay crates.
//!
//! One subscriber per test binary, installed by a `ctor` in each binary.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Level used when neither `TEST_LOG` nor `RUST_LOG` is set.
const DEFAULT_DIRECTIVES: &str = "warn";

/// sqlx logs every statement at `info`; an overlay restore replays a whole
/// fixture set, so statements stay quiet unless a directive names sqlx.
const QUIET_STATEMENTS: &str = "sqlx::query=warn";

/// Builds the filter from `TEST_LOG`, then `RUST_LOG`, then `"warn"`.
pub fn filter_directives(test_log: Option<&str>, rust_log: Option<&str>) -> String {
    let base = test_log
        .or(rust_log)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVES);
    if base.contains("sqlx") {
        base.to_string()
    } else {
        format!("{base},{QUIET_STATEMENTS}")
    }
}

/// Installs the test subscriber. Idempotent; a subscriber installed by
/// someone else is left in place.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let test_log = std::env::var("TEST_LOG").ok();
        let rust_log = std::env::var("RUST_LOG").ok();
        let directives = filter_directives(test_log.as_deref(), rust_log.as_deref());
        let filter =
            EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .with_target(true)
            .try_init();
    });
}
