use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseBackend, FromQueryResult};
use serde_json::Value as JsonValue;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::trace;

use super::{ActiveBackend, ConnectionHandle, DataType, ModelDefinition, Record};
use crate::error::OverlayError;

/// A model of a connection, resolved on every call.
///
/// Each operation looks the definition up in the registry (following an
/// overlay binding if present) and runs against the connection's current
/// backend, so a handle taken before a redirect follows the redirect.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    connection: ConnectionHandle,
    name: String,
}

impl ModelHandle {
    pub(crate) fn new(connection: ConnectionHandle, name: &str) -> Self {
        Self {
            connection,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Definition currently in effect for this model.
    pub fn definition(&self) -> Result<Arc<ModelDefinition>, OverlayError> {
        self.connection
            .registry()
            .get(&self.name)
            .ok_or_else(|| OverlayError::unknown_model(&self.name))
    }

    fn resolve(&self) -> Result<(Arc<ModelDefinition>, Arc<ActiveBackend>), OverlayError> {
        Ok((self.definition()?, self.connection.active_backend()))
    }

    /// Creates the backing table if it does not exist.
    pub async fn sync(&self) -> Result<(), OverlayError> {
        let (def, backend) = self.resolve()?;
        let stmt = backend.query_interface().create_table(&def);
        trace!(model = %def.name(), sql = %stmt, "sync");
        backend.pool().execute(stmt).await?;
        Ok(())
    }

    pub async fn drop_table(&self) -> Result<(), OverlayError> {
        let (def, backend) = self.resolve()?;
        backend
            .pool()
            .execute(backend.query_interface().drop_table(&def))
            .await?;
        Ok(())
    }

    /// Inserts one record and returns it as stored, generated values included.
    pub async fn create(&self, record: Record) -> Result<Record, OverlayError> {
        let (def, backend) = self.resolve()?;
        let now = timestamp()?;
        let stmt = backend.query_interface().insert(&def, &record, &now)?;
        let result = backend.pool().execute(stmt).await?;

        let mut created = record;
        for (field, attr) in def.attributes() {
            if let Some(default) = &attr.default_value {
                created
                    .entry(field.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        if let Some((created_col, updated_col)) = def.timestamp_columns() {
            for column in [created_col, updated_col] {
                created
                    .entry(column.to_string())
                    .or_insert_with(|| JsonValue::String(now.clone()));
            }
        }
        if let Some((pk, attr)) = def.primary_key() {
            // last_insert_id is only meaningful for SQLite here
            if attr.auto_increment
                && !created.contains_key(pk)
                && backend.dialect() == DatabaseBackend::Sqlite
            {
                created.insert(pk.to_string(), JsonValue::from(result.last_insert_id()));
            }
        }
        Ok(created)
    }

    pub async fn bulk_create(&self, records: Vec<Record>) -> Result<Vec<Record>, OverlayError> {
        let mut created = Vec::with_capacity(records.len());
        for record in records {
            created.push(self.create(record).await?);
        }
        Ok(created)
    }

    pub async fn find_by_pk(&self, pk: impl Into<JsonValue>) -> Result<Option<Record>, OverlayError> {
        let (def, backend) = self.resolve()?;
        let stmt = backend.query_interface().select_by_pk(&def, &pk.into())?;
        let row = JsonValue::find_by_statement(stmt)
            .one(backend.pool())
            .await?;
        row.map(|row| decode_row(&def, row)).transpose()
    }

    /// Live rows ordered by primary key.
    pub async fn find_all(&self) -> Result<Vec<Record>, OverlayError> {
        let (def, backend) = self.resolve()?;
        let stmt = backend.query_interface().select_all(&def);
        let rows = JsonValue::find_by_statement(stmt)
            .all(backend.pool())
            .await?;
        rows.into_iter().map(|row| decode_row(&def, row)).collect()
    }

    pub async fn count(&self) -> Result<u64, OverlayError> {
        let (def, backend) = self.resolve()?;
        let row = backend
            .pool()
            .query_one(backend.query_interface().count(&def))
            .await?
            .ok_or_else(|| OverlayError::db("count query returned no row"))?;
        let count: i64 = row.try_get("", "count")?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Deletes (or soft-deletes) by primary key; returns affected rows.
    pub async fn destroy(&self, pk: impl Into<JsonValue>) -> Result<u64, OverlayError> {
        let (def, backend) = self.resolve()?;
        let now = timestamp()?;
        let stmt = backend
            .query_interface()
            .delete_by_pk(&def, &pk.into(), &now)?;
        let result = backend.pool().execute(stmt).await?;
        Ok(result.rows_affected())
    }
}

fn timestamp() -> Result<String, OverlayError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| OverlayError::db(format!("timestamp formatting failed: {e}")))
}

fn decode_row(def: &ModelDefinition, row: JsonValue) -> Result<Record, OverlayError> {
    let JsonValue::Object(mut record) = row else {
        return Err(OverlayError::db(format!(
            "row of {} did not decode to an object",
            def.name()
        )));
    };
    for (field, attr) in def.attributes() {
        let Some(value) = record.get_mut(field) else {
            continue;
        };
        match (attr.kind(), &*value) {
            (DataType::Json, JsonValue::String(raw)) => {
                if let Ok(parsed) = serde_json::from_str(raw) {
                    *value = parsed;
                }
            }
            // SQLite stores booleans as integers
            (DataType::Boolean, JsonValue::Number(n)) => {
                *value = JsonValue::Bool(n.as_i64().unwrap_or_default() != 0);
            }
            _ => {}
        }
    }
    Ok(record)
}
