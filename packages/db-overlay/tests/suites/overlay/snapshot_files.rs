use db_overlay::{
    ConnectionConfig, ConnectionHandle, OverlayError, OverlayOptions, SnapshotLayout,
    SnapshotManager, SnapshotState,
};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{item_model, item_names, items_fixture, original_with, rec};

fn manager(dir: &TempDir, keep: bool) -> SnapshotManager {
    SnapshotManager::new(
        SnapshotLayout::new(dir.path().join("snapshots"), "files"),
        keep,
        false,
    )
}

fn file_options(dir: &TempDir) -> OverlayOptions {
    OverlayOptions::new()
        .with_logging(false)
        .with_temp_root(dir.path().join("snapshots"))
        .with_namespace("files")
}

#[tokio::test]
async fn setup_database_writes_working_and_backup() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let mut snapshots = manager(&dir, false);
    assert_eq!(snapshots.state(), SnapshotState::Absent);

    let shadow = snapshots
        .setup_database(&original, &[items_fixture(&dir)], &file_options(&dir))
        .await
        .unwrap();

    assert_eq!(snapshots.state(), SnapshotState::Active);
    assert!(snapshots.layout().working_path().is_file());
    assert!(snapshots.backup_exists().await.unwrap());
    assert_eq!(item_names(&shadow).await, vec!["a"]);

    snapshots.cleanup_database(&shadow).await.unwrap();
    assert_eq!(snapshots.state(), SnapshotState::TornDown);
    assert!(!snapshots.layout().dir().exists());
}

#[tokio::test]
async fn restore_from_backup_resets_working_file() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let mut snapshots = manager(&dir, false);
    let shadow: ConnectionHandle = snapshots
        .setup_database(&original, &[items_fixture(&dir)], &file_options(&dir))
        .await
        .unwrap();

    let items = shadow.model("Item").unwrap();
    items.create(rec(json!({ "id": 7, "name": "scratch" }))).await.unwrap();
    items.destroy(1).await.unwrap();

    snapshots.restore_from_backup(&shadow).await.unwrap();
    snapshots.restore_from_backup(&shadow).await.unwrap();

    assert_eq!(item_names(&shadow).await, vec!["a"]);
    assert_eq!(snapshots.restore_count(), 2);

    snapshots.cleanup_database(&shadow).await.unwrap();
}

#[tokio::test]
async fn restore_backup_without_backup_is_not_found() {
    let dir = TempDir::new().unwrap();
    let snapshots = manager(&dir, false);
    snapshots.verify_or_create_temp_root().await.unwrap();
    snapshots.create_clean_folder().await.unwrap();

    let err = snapshots.restore_backup().await.unwrap_err();
    match err {
        OverlayError::Io { source, path, .. } => {
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            assert!(path.ends_with("backup.db"));
        }
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[tokio::test]
async fn create_clean_folder_drops_stale_files() {
    let dir = TempDir::new().unwrap();
    let snapshots = manager(&dir, false);
    snapshots.create_clean_folder().await.unwrap();
    let stale = snapshots.layout().dir().join("stale.db");
    std::fs::write(&stale, b"left over").unwrap();

    snapshots.create_clean_folder().await.unwrap();

    assert!(snapshots.layout().dir().is_dir());
    assert!(!stale.exists());
}

#[tokio::test]
async fn discard_with_retention_keeps_backup() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let mut snapshots = manager(&dir, true);
    let shadow = snapshots
        .setup_database(&original, &[items_fixture(&dir)], &file_options(&dir))
        .await
        .unwrap();

    snapshots.cleanup_database(&shadow).await.unwrap();

    let layout = snapshots.layout();
    assert!(!layout.working_path().exists());
    assert!(layout.backup_path().is_file());
    assert!(layout.dir().is_dir());
}
