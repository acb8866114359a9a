use db_overlay::{cleanup, restore, setup, ConnectionConfig, ConnectionHandle, OverlayOptions};
use overlay_test_support::{unique_namespace, write_fixture_file};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{item_model, item_names, original_with, overlay_options, rec};

async fn run_in_namespace(dir: &TempDir, label: &str) -> Vec<String> {
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let fixture = write_fixture_file(
        dir,
        &format!("{label}.json"),
        json!([{ "model": "Item", "data": { "id": 1, "name": format!("{label}-fixture") } }]),
    );
    let mut session = setup(&original, &[fixture], overlay_options(dir))
        .await
        .unwrap();

    let items = original.model("Item").unwrap();
    for n in 2..=5 {
        items
            .create(rec(json!({ "id": n, "name": format!("{label}-{n}") })))
            .await
            .unwrap();
        tokio::task::yield_now().await;
    }
    let seen = item_names(&original).await;

    restore(&mut session).await.unwrap();
    assert_eq!(item_names(&original).await, vec![format!("{label}-fixture")]);

    cleanup(session).await.unwrap();
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_namespaces_do_not_share_records() {
    let dir = TempDir::new().unwrap();

    let (left, right) = tokio::join!(run_in_namespace(&dir, "left"), run_in_namespace(&dir, "right"));

    assert_eq!(left.len(), 5);
    assert_eq!(right.len(), 5);
    assert!(left.iter().all(|name| name.starts_with("left")));
    assert!(right.iter().all(|name| name.starts_with("right")));
}

#[tokio::test]
async fn original_data_is_hidden_during_overlay_and_kept_after() {
    let dir = TempDir::new().unwrap();
    let original_db = dir.path().join("app.db");
    let original = original_with(ConnectionConfig::sqlite_file(&original_db), vec![item_model()]).await;
    original.sync_all().await.unwrap();
    original
        .model("Item")
        .unwrap()
        .create(rec(json!({ "id": 42, "name": "production" })))
        .await
        .unwrap();

    let session = setup(&original, &[] as &[std::path::PathBuf], overlay_options(&dir))
        .await
        .unwrap();
    assert!(item_names(&original).await.is_empty());
    original
        .model("Item")
        .unwrap()
        .create(rec(json!({ "id": 1, "name": "test-only" })))
        .await
        .unwrap();
    cleanup(session).await.unwrap();

    assert_eq!(item_names(&original).await, vec!["production"]);
}

#[tokio::test]
async fn two_handles_can_overlay_independently() {
    let dir = TempDir::new().unwrap();
    let first = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let second: ConnectionHandle = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;

    let a = setup(&first, &[] as &[std::path::PathBuf], overlay_options(&dir))
        .await
        .unwrap();
    let b = setup(&second, &[] as &[std::path::PathBuf], overlay_options(&dir))
        .await
        .unwrap();
    assert_ne!(a.namespace(), b.namespace());
    assert!(!a.shadow().ptr_eq(b.shadow()));

    first
        .model("Item")
        .unwrap()
        .create(rec(json!({ "name": "only-first" })))
        .await
        .unwrap();
    assert!(item_names(&second).await.is_empty());

    cleanup(a).await.unwrap();
    cleanup(b).await.unwrap();
}

#[tokio::test]
async fn shared_namespace_is_refused_while_in_use() {
    let dir = TempDir::new().unwrap();
    let namespace = unique_namespace("shared");
    let options = || {
        OverlayOptions::new()
            .with_logging(false)
            .with_temp_root(dir.path().join("overlay"))
            .with_namespace(namespace.clone())
    };
    let fixture_a = write_fixture_file(
        &dir,
        "a.json",
        json!([{ "model": "Item", "data": { "id": 1, "name": "A" } }]),
    );
    let fixture_b = write_fixture_file(
        &dir,
        "b.json",
        json!([{ "model": "Item", "data": { "id": 1, "name": "B" } }]),
    );

    let first = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let second = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let mut session_a = setup(&first, &[&fixture_a], options()).await.unwrap();

    let err = setup(&second, &[&fixture_b], options()).await.unwrap_err();
    assert!(err.is_config());
    assert!(second.active_session().is_none());

    // the refused setup left the first session's files alone
    assert!(session_a.layout().backup_path().is_file());
    restore(&mut session_a).await.unwrap();
    assert_eq!(item_names(&first).await, vec!["A"]);
    cleanup(session_a).await.unwrap();

    let session_b = setup(&second, &[&fixture_b], options()).await.unwrap();
    assert_eq!(item_names(&second).await, vec!["B"]);
    cleanup(session_b).await.unwrap();
}
