use crate::config::db::{ConnectionConfig, DialectConfig, SqliteStorage};
use crate::config::overlay::OverlayOptions;
use crate::overlay::snapshot::SnapshotLayout;

/// Database name every shadow connection reports.
pub const MOCK_DATABASE_NAME: &str = "test-database";

/// Derives the shadow connection's configuration from the original's.
///
/// The original configuration is cloned, never mutated. Pool sizing and
/// model defaults carry over; the engine is always SQLite, stored in the
/// layout's working file in file mode and in memory otherwise.
pub fn adapt_config(
    original: &ConnectionConfig,
    options: &OverlayOptions,
    layout: &SnapshotLayout,
) -> ConnectionConfig {
    let storage = if options.use_from_file_database {
        SqliteStorage::File(layout.working_path())
    } else {
        SqliteStorage::Memory
    };

    let mut adapted = original.clone();
    adapted.database = MOCK_DATABASE_NAME.to_string();
    adapted.dialect = DialectConfig::Sqlite { storage };
    adapted.sqlx_logging = options.logging;
    if adapted.is_in_memory() {
        adapted.pool.pool_min = 1;
        adapted.pool.pool_max = 1;
    }
    adapted
}
