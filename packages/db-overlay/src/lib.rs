//! Database overlay for tests.
//!
//! Substitutes a disposable SQLite backend behind a live [`ConnectionHandle`],
//! mirrors its models, loads fixtures, and snapshots the prepared database so
//! every test starts from the same state. Code holding the original handle
//! keeps working and never learns about the substitution.

pub mod config;
pub mod error;
pub mod orm;
pub mod overlay;

pub use config::db::{ConnectionConfig, DialectConfig, PoolSettings, SqliteStorage};
pub use config::overlay::{FixtureTransform, OverlayOptions};
pub use error::OverlayError;
pub use orm::{
    ActiveBackend, AttributeDef, BackendId, ConnectionHandle, ConnectionId, DataType,
    DefineOptions, ModelDefinition, ModelHandle, Record, SessionId, TypeDescriptor,
};
pub use overlay::fixtures::{
    load_fixture_file, load_fixture_files, load_fixtures, FixtureOptions, FixtureRecord,
};
pub use overlay::lifecycle::{cleanup, restore, setup, MockSession};
pub use overlay::snapshot::{SnapshotLayout, SnapshotManager, SnapshotState};

#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    overlay_test_support::test_logging::init();
}
