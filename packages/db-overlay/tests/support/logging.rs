//! Logging for the integration test binaries.
//!
//! Level comes from `TEST_LOG`, then `RUST_LOG`, then `"warn"`:
//!
//! ```bash
//! TEST_LOG=db_overlay=debug cargo test -p db-overlay --test overlay_tests
//! ```

/// Runs once per integration test binary, before any test.
#[ctor::ctor]
fn _auto_init_for_integration_tests() {
    overlay_test_support::test_logging::init();
}
