use std::path::PathBuf;
use std::sync::Arc;

use db_overlay::{
    cleanup, restore, setup, AttributeDef, ConnectionConfig, DataType, ModelDefinition,
    OverlayError,
};
use serde_json::json;
use tempfile::TempDir;

use crate::support::{item_model, items_fixture, original_with, overlay_options, rec};

fn tag_model() -> ModelDefinition {
    ModelDefinition::new("Tag")
        .attribute("label", AttributeDef::new(DataType::String(32)).not_null())
        .attribute("weight", AttributeDef::new(DataType::Integer).default_value(1))
}

#[tokio::test]
async fn model_declared_after_setup_is_mirrored_before_first_query() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let session = setup(&original, &[items_fixture(&dir)], overlay_options(&dir))
        .await
        .unwrap();

    let declared = original.define(tag_model()).await.unwrap();

    let mirrored = session
        .shadow()
        .registry()
        .get("Tag")
        .expect("Tag should be mirrored into the shadow");
    assert_eq!(mirrored.field_names(), declared.field_names());
    assert_eq!(mirrored.owner(), Some(session.shadow().id()));

    let tags = original.model("Tag").unwrap();
    let created = tags.create(rec(json!({ "label": "new" }))).await.unwrap();
    assert_eq!(created["weight"], json!(1));
    assert_eq!(tags.count().await.unwrap(), 1);

    cleanup(session).await.unwrap();
}

#[tokio::test]
async fn live_model_table_survives_restore() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let mut session = setup(&original, &[items_fixture(&dir)], overlay_options(&dir))
        .await
        .unwrap();
    original.define(tag_model()).await.unwrap();
    let tags = original.model("Tag").unwrap();
    tags.create(rec(json!({ "label": "temp" }))).await.unwrap();

    // backup predates Tag: restore has to create its table again
    restore(&mut session).await.unwrap();

    assert_eq!(tags.count().await.unwrap(), 0);
    tags.create(rec(json!({ "label": "again" }))).await.unwrap();

    cleanup(session).await.unwrap();
}

#[tokio::test]
async fn define_after_cleanup_has_no_overlay_effect() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let session = setup(&original, &[] as &[PathBuf], overlay_options(&dir))
        .await
        .unwrap();
    let shadow = session.shadow().clone();
    cleanup(session).await.unwrap();

    original.define(tag_model()).await.unwrap();

    assert!(!shadow.registry().contains("Tag"));
    assert!(!original.registry().is_bound("Tag"));
    assert_eq!(
        original.model("Tag").unwrap().definition().unwrap().owner(),
        Some(original.id())
    );
}

#[tokio::test]
async fn mirroring_failure_is_reported_by_next_phase() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let mut session = setup(
        &original,
        &[] as &[PathBuf],
        overlay_options(&dir).use_from_file_database(false),
    )
    .await
    .unwrap();

    // closed pool: the shadow table for Tag cannot be created
    session.shadow().close().await.unwrap();
    let err = original.define(tag_model()).await.unwrap_err();
    assert!(matches!(err, OverlayError::LiveMirror { .. }));

    let surfaced = restore(&mut session).await.unwrap_err();
    assert!(matches!(surfaced, OverlayError::LiveMirror { ref model, .. } if model == "Tag"));

    // reported once: cleanup no longer sees it
    let before_setup = session.displaced_backend().cloned().unwrap();
    cleanup(session).await.unwrap();
    assert!(Arc::ptr_eq(&original.active_backend(), &before_setup));
}

#[tokio::test]
async fn mirroring_failure_is_reported_by_cleanup() {
    let dir = TempDir::new().unwrap();
    let original = original_with(ConnectionConfig::sqlite_memory(), vec![item_model()]).await;
    let before = original.active_backend();
    let session = setup(
        &original,
        &[] as &[PathBuf],
        overlay_options(&dir).use_from_file_database(false),
    )
    .await
    .unwrap();

    session.shadow().close().await.unwrap();
    assert!(original.define(tag_model()).await.is_err());

    let err = cleanup(session).await.unwrap_err();
    assert!(matches!(err, OverlayError::LiveMirror { ref model, .. } if model == "Tag"));
    assert!(Arc::ptr_eq(&original.active_backend(), &before));
    assert!(original.active_session().is_none());
    assert!(!original.registry().has_listener());
}
