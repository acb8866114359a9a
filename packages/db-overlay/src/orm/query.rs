use sea_orm::sea_query::{
    Alias, Asterisk, ColumnDef, Expr, Order, Query, SimpleExpr, Table, Value,
};
use sea_orm::{DatabaseBackend, Statement};
use serde_json::Value as JsonValue;

use super::{AttributeDef, DataType, ModelDefinition, Record};
use crate::error::OverlayError;

/// Builds dialect-specific statements for dynamic models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryInterface {
    dialect: DatabaseBackend,
}

impl QueryInterface {
    pub fn new(dialect: DatabaseBackend) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> DatabaseBackend {
        self.dialect
    }

    /// `CREATE TABLE IF NOT EXISTS` including generated timestamp columns.
    pub fn create_table(&self, def: &ModelDefinition) -> Statement {
        let mut stmt = Table::create();
        stmt.table(Alias::new(def.table_name())).if_not_exists();

        for (name, attr) in def.attributes() {
            stmt.col(self.column_def(name, attr));
        }
        if let Some((created, updated)) = def.timestamp_columns() {
            stmt.col(ColumnDef::new(Alias::new(created)).text().not_null());
            stmt.col(ColumnDef::new(Alias::new(updated)).text().not_null());
        }
        if let Some(deleted) = def.deleted_at_column() {
            stmt.col(ColumnDef::new(Alias::new(deleted)).text().null());
        }
        self.dialect.build(&stmt)
    }

    pub fn drop_table(&self, def: &ModelDefinition) -> Statement {
        let mut stmt = Table::drop();
        stmt.table(Alias::new(def.table_name())).if_exists();
        self.dialect.build(&stmt)
    }

    /// Insert for `record`. Omitted fields fall back to attribute defaults;
    /// omitted timestamps are set to `now`.
    pub fn insert(&self, def: &ModelDefinition, record: &Record, now: &str) -> Result<Statement, OverlayError> {
        let mut columns = Vec::new();
        let mut values: Vec<SimpleExpr> = Vec::new();

        for (field, raw) in record {
            let kind = def.column_type(field).ok_or_else(|| {
                OverlayError::invalid_record(def.name(), field, "unknown field")
            })?;
            columns.push(Alias::new(field));
            values.push(json_to_value(def.name(), field, kind, raw)?.into());
        }
        for (field, attr) in def.attributes() {
            if record.contains_key(field) {
                continue;
            }
            if let Some(default) = &attr.default_value {
                columns.push(Alias::new(field));
                values.push(json_to_value(def.name(), field, attr.kind(), default)?.into());
            }
        }
        if let Some((created, updated)) = def.timestamp_columns() {
            for column in [created, updated] {
                if !record.contains_key(column) {
                    columns.push(Alias::new(column));
                    values.push(Value::from(now).into());
                }
            }
        }

        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(def.table_name()));
        if values.is_empty() {
            stmt.or_default_values();
        } else {
            stmt.columns(columns);
            stmt.values(values)?;
        }
        Ok(self.dialect.build(&stmt))
    }

    /// Live rows ordered by primary key.
    pub fn select_all(&self, def: &ModelDefinition) -> Statement {
        let mut stmt = Query::select();
        stmt.column(Asterisk).from(Alias::new(def.table_name()));
        if let Some(deleted) = def.deleted_at_column() {
            stmt.and_where(Expr::col(Alias::new(deleted)).is_null());
        }
        if let Some((pk, _)) = def.primary_key() {
            stmt.order_by(Alias::new(pk), Order::Asc);
        }
        self.dialect.build(&stmt)
    }

    pub fn select_by_pk(&self, def: &ModelDefinition, pk: &JsonValue) -> Result<Statement, OverlayError> {
        let (pk_name, pk_value) = primary_key_value(def, pk)?;
        let mut stmt = Query::select();
        stmt.column(Asterisk)
            .from(Alias::new(def.table_name()))
            .and_where(Expr::col(Alias::new(pk_name)).eq(pk_value));
        if let Some(deleted) = def.deleted_at_column() {
            stmt.and_where(Expr::col(Alias::new(deleted)).is_null());
        }
        Ok(self.dialect.build(&stmt))
    }

    /// Counts live rows into a column named `count`.
    pub fn count(&self, def: &ModelDefinition) -> Statement {
        let mut stmt = Query::select();
        stmt.expr_as(Expr::cust("COUNT(*)"), Alias::new("count"))
            .from(Alias::new(def.table_name()));
        if let Some(deleted) = def.deleted_at_column() {
            stmt.and_where(Expr::col(Alias::new(deleted)).is_null());
        }
        self.dialect.build(&stmt)
    }

    /// Hard delete, or a deletion stamp for paranoid models.
    pub fn delete_by_pk(&self, def: &ModelDefinition, pk: &JsonValue, now: &str) -> Result<Statement, OverlayError> {
        let (pk_name, pk_value) = primary_key_value(def, pk)?;
        let table = Alias::new(def.table_name());

        if let Some(deleted) = def.deleted_at_column() {
            let mut stmt = Query::update();
            stmt.table(table)
                .value(Alias::new(deleted), now)
                .and_where(Expr::col(Alias::new(pk_name)).eq(pk_value))
                .and_where(Expr::col(Alias::new(deleted)).is_null());
            return Ok(self.dialect.build(&stmt));
        }

        let mut stmt = Query::delete();
        stmt.from_table(table)
            .and_where(Expr::col(Alias::new(pk_name)).eq(pk_value));
        Ok(self.dialect.build(&stmt))
    }

    fn column_def(&self, name: &str, attr: &AttributeDef) -> ColumnDef {
        let mut col = ColumnDef::new(Alias::new(name));
        match attr.kind() {
            DataType::Integer => {
                col.integer();
            }
            // SQLite only auto-increments an INTEGER PRIMARY KEY
            DataType::BigInt if attr.auto_increment && self.dialect == DatabaseBackend::Sqlite => {
                col.integer();
            }
            DataType::BigInt => {
                col.big_integer();
            }
            DataType::Float => {
                col.float();
            }
            DataType::Double => {
                col.double();
            }
            DataType::Boolean => {
                col.boolean();
            }
            DataType::String(len) => {
                col.string_len(len);
            }
            DataType::Text | DataType::Date | DataType::Json => {
                col.text();
            }
        }
        if attr.primary_key {
            col.primary_key();
        }
        if attr.auto_increment {
            col.auto_increment();
        }
        if !attr.allow_null {
            col.not_null();
        }
        if attr.unique && !attr.primary_key {
            col.unique_key();
        }
        col
    }
}

fn primary_key_value(def: &ModelDefinition, pk: &JsonValue) -> Result<(String, Value), OverlayError> {
    let (name, attr) = def
        .primary_key()
        .ok_or_else(|| OverlayError::invalid_record(def.name(), "<primary key>", "model has no primary key"))?;
    let value = json_to_value(def.name(), name, attr.kind(), pk)?;
    Ok((name.to_string(), value))
}

/// Converts a JSON field value to a statement value of the column's type.
pub(crate) fn json_to_value(
    model: &str,
    field: &str,
    kind: DataType,
    raw: &JsonValue,
) -> Result<Value, OverlayError> {
    let mismatch = || {
        OverlayError::invalid_record(model, field, format!("expected {kind:?} value, got {raw}"))
    };
    let value = match (kind, raw) {
        (DataType::Integer | DataType::BigInt, JsonValue::Null) => Value::BigInt(None),
        (DataType::Float | DataType::Double, JsonValue::Null) => Value::Double(None),
        (DataType::Boolean, JsonValue::Null) => Value::Bool(None),
        (_, JsonValue::Null) => Value::String(None),
        (DataType::Integer | DataType::BigInt, JsonValue::Number(n)) => {
            Value::from(n.as_i64().ok_or_else(mismatch)?)
        }
        (DataType::Float | DataType::Double, JsonValue::Number(n)) => {
            Value::from(n.as_f64().ok_or_else(mismatch)?)
        }
        (DataType::Boolean, JsonValue::Bool(b)) => Value::from(*b),
        (DataType::String(_) | DataType::Text | DataType::Date, JsonValue::String(s)) => {
            Value::from(s.as_str())
        }
        (DataType::Json, other) => Value::from(other.to_string()),
        _ => return Err(mismatch()),
    };
    Ok(value)
}
