use std::sync::Arc;

use db_overlay::{cleanup, restore, setup, ConnectionConfig, OverlayOptions, SqliteStorage};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{item_model, item_names, items_fixture, original_with, overlay_options, rec};

fn memory_options(dir: &TempDir) -> OverlayOptions {
    overlay_options(dir).use_from_file_database(false)
}

#[tokio::test]
async fn memory_shadow_never_touches_disk() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;

    let session = setup(&original, &[items_fixture(&dir)], memory_options(&dir))
        .await
        .unwrap();

    assert!(!session.is_file_backed());
    assert!(matches!(
        session.shadow().config().dialect,
        db_overlay::DialectConfig::Sqlite {
            storage: SqliteStorage::Memory
        }
    ));
    assert!(!dir.path().join("overlay").exists());
    assert_eq!(item_names(&original).await, vec!["a"]);

    cleanup(session).await.unwrap();
    assert!(!dir.path().join("overlay").exists());
}

#[tokio::test]
async fn memory_restore_rebuilds_from_fixtures() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let mut session = setup(&original, &[items_fixture(&dir)], memory_options(&dir))
        .await
        .unwrap();
    let items = original.model("Item").unwrap();

    items.create(rec(json!({ "id": 2, "name": "b" }))).await.unwrap();
    items.destroy(1).await.unwrap();
    assert_eq!(item_names(&original).await, vec!["b"]);

    restore(&mut session).await.unwrap();
    assert_eq!(item_names(&original).await, vec!["a"]);

    restore(&mut session).await.unwrap();
    assert_eq!(items.count().await.unwrap(), 1);

    cleanup(session).await.unwrap();
}

#[tokio::test]
async fn memory_cleanup_hands_back_original_backend() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let before = original.active_backend();

    let session = setup(&original, &[items_fixture(&dir)], memory_options(&dir))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&original.active_backend(), &before));

    cleanup(session).await.unwrap();
    assert!(Arc::ptr_eq(&original.active_backend(), &before));
    assert!(original.active_session().is_none());
}
