//! Fixture file helpers

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

/// Write `records` as a JSON fixture file named `name` inside `dir`.
///
/// Panics on I/O failure; only meant for test setup.
pub fn write_fixture_file(dir: &TempDir, name: &str, records: serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("fixture file should be creatable");
    let body = serde_json::to_vec_pretty(&records).expect("fixture records should serialize");
    file.write_all(&body).expect("fixture file should be writable");
    path
}
