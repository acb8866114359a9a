//! Models, fixtures and options shared by the overlay suites.

use std::path::PathBuf;

use db_overlay::{
    AttributeDef, ConnectionConfig, ConnectionHandle, DataType, DefineOptions, ModelDefinition,
    OverlayOptions, Record,
};
use overlay_test_support::{unique_namespace, write_fixture_file};
use serde_json::{json, Value};
use tempfile::TempDir;

/// `Item{id,name}` without timestamps.
pub fn item_model() -> ModelDefinition {
    ModelDefinition::new("Item")
        .attribute(
            "id",
            AttributeDef::new(DataType::Integer)
                .primary_key()
                .auto_increment(),
        )
        .attribute("name", AttributeDef::new(DataType::Text))
        .with_options(DefineOptions {
            timestamps: false,
            ..DefineOptions::default()
        })
}

pub fn user_model() -> ModelDefinition {
    ModelDefinition::new("User")
        .attribute(
            "email",
            AttributeDef::new(DataType::String(128)).not_null().unique(),
        )
        .attribute("admin", AttributeDef::new(DataType::Boolean).default_value(false))
}

pub async fn original_with(config: ConnectionConfig, models: Vec<ModelDefinition>) -> ConnectionHandle {
    let conn = ConnectionHandle::connect(config)
        .await
        .expect("original connection should open");
    for model in models {
        conn.define(model).await.expect("model should be declared");
    }
    conn
}

pub fn rec(value: Value) -> Record {
    value
        .as_object()
        .cloned()
        .expect("record literal should be a JSON object")
}

/// Fixture file holding the single record `Item{id:1,name:"a"}`.
pub fn items_fixture(dir: &TempDir) -> PathBuf {
    write_fixture_file(
        dir,
        "items.json",
        json!([{ "model": "Item", "data": { "id": 1, "name": "a" } }]),
    )
}

/// Quiet options rooted in `dir` with a fresh namespace.
pub fn overlay_options(dir: &TempDir) -> OverlayOptions {
    OverlayOptions::new()
        .with_logging(false)
        .with_temp_root(dir.path().join("overlay"))
        .with_namespace(unique_namespace("suite"))
}

/// Item names in primary-key order, as seen through `conn`.
pub async fn item_names(conn: &ConnectionHandle) -> Vec<String> {
    conn.model("Item")
        .expect("Item should be registered")
        .find_all()
        .await
        .expect("Item rows should load")
        .into_iter()
        .map(|row| row["name"].as_str().unwrap_or_default().to_string())
        .collect()
}
