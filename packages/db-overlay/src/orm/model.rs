use std::collections::BTreeMap;

use sea_orm::DatabaseBackend;
use serde_json::Value as JsonValue;

use super::ConnectionId;
use crate::error::OverlayError;

/// Column data types understood by the query interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    BigInt,
    Float,
    Double,
    Boolean,
    /// Bounded string (`VARCHAR(n)`).
    String(u32),
    Text,
    /// Stored as RFC 3339 text.
    Date,
    /// Stored as serialized JSON text.
    Json,
}

/// Connection a type descriptor was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeBinding {
    pub connection: ConnectionId,
    pub dialect: DatabaseBackend,
}

/// A field's type, bound to the connection that declared it.
///
/// Deliberately not `Clone`: moving a model to another connection has to go
/// through [`TypeDescriptor::rebuild_for`] so the binding is never aliased.
#[derive(Debug, PartialEq)]
pub struct TypeDescriptor {
    kind: DataType,
    binding: Option<TypeBinding>,
}

impl TypeDescriptor {
    pub fn new(kind: DataType) -> Self {
        Self {
            kind,
            binding: None,
        }
    }

    pub fn kind(&self) -> DataType {
        self.kind
    }

    pub fn binding(&self) -> Option<&TypeBinding> {
        self.binding.as_ref()
    }

    pub fn rebuild_for(&self, connection: ConnectionId, dialect: DatabaseBackend) -> Self {
        Self {
            kind: self.kind,
            binding: Some(TypeBinding {
                connection,
                dialect,
            }),
        }
    }
}

/// One field of a model.
#[derive(Debug, PartialEq)]
pub struct AttributeDef {
    pub type_descriptor: TypeDescriptor,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub allow_null: bool,
    pub unique: bool,
    /// Inserted when a record omits the field.
    pub default_value: Option<JsonValue>,
}

impl AttributeDef {
    pub fn new(kind: DataType) -> Self {
        Self {
            type_descriptor: TypeDescriptor::new(kind),
            primary_key: false,
            auto_increment: false,
            allow_null: true,
            unique: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.allow_null = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn kind(&self) -> DataType {
        self.type_descriptor.kind()
    }

    fn rebuild_for(&self, connection: ConnectionId, dialect: DatabaseBackend) -> Self {
        Self {
            type_descriptor: self.type_descriptor.rebuild_for(connection, dialect),
            primary_key: self.primary_key,
            auto_increment: self.auto_increment,
            allow_null: self.allow_null,
            unique: self.unique,
            default_value: self.default_value.clone(),
        }
    }
}

/// Per-model behavior switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineOptions {
    /// Maintain creation/update timestamp columns.
    pub timestamps: bool,
    /// Soft delete: `destroy` stamps a deletion column instead of removing the row.
    pub paranoid: bool,
    /// snake_case names for the generated timestamp columns.
    pub underscored: bool,
    /// Use the model name as the table name instead of its plural.
    pub freeze_table_name: bool,
    pub table_name: Option<String>,
}

const DEFAULT_DEFINE_OPTIONS: DefineOptions = DefineOptions {
    timestamps: true,
    paranoid: false,
    underscored: false,
    freeze_table_name: false,
    table_name: None,
};

impl Default for DefineOptions {
    fn default() -> Self {
        DEFAULT_DEFINE_OPTIONS
    }
}

/// Name, attributes and options of one model.
///
/// Registered definitions live behind an `Arc` and are never mutated; a
/// connection binds a definition to itself when it is declared or mirrored.
#[derive(Debug, PartialEq)]
pub struct ModelDefinition {
    name: String,
    attributes: BTreeMap<String, AttributeDef>,
    options: Option<DefineOptions>,
    owner: Option<ConnectionId>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            options: None,
            owner: None,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute: AttributeDef) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn with_options(mut self, options: DefineOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeDef> {
        &self.attributes
    }

    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }

    pub fn options(&self) -> &DefineOptions {
        self.options.as_ref().unwrap_or(&DEFAULT_DEFINE_OPTIONS)
    }

    /// Connection this definition is bound to; `None` until declared.
    pub fn owner(&self) -> Option<ConnectionId> {
        self.owner
    }

    pub fn table_name(&self) -> String {
        let options = self.options();
        if let Some(table) = &options.table_name {
            return table.clone();
        }
        if options.freeze_table_name {
            self.name.clone()
        } else {
            format!("{}s", self.name)
        }
    }

    pub fn primary_key(&self) -> Option<(&str, &AttributeDef)> {
        self.attributes
            .iter()
            .find(|(_, attr)| attr.primary_key)
            .map(|(name, attr)| (name.as_str(), attr))
    }

    /// `(created, updated)` column names when timestamps are on.
    pub fn timestamp_columns(&self) -> Option<(&'static str, &'static str)> {
        let options = self.options();
        if !options.timestamps {
            return None;
        }
        Some(if options.underscored {
            ("created_at", "updated_at")
        } else {
            ("createdAt", "updatedAt")
        })
    }

    pub fn deleted_at_column(&self) -> Option<&'static str> {
        let options = self.options();
        if !options.paranoid {
            return None;
        }
        Some(if options.underscored {
            "deleted_at"
        } else {
            "deletedAt"
        })
    }

    /// Type of any column of the table, generated columns included.
    pub fn column_type(&self, column: &str) -> Option<DataType> {
        if let Some(attr) = self.attributes.get(column) {
            return Some(attr.kind());
        }
        let is_timestamp = self
            .timestamp_columns()
            .is_some_and(|(created, updated)| column == created || column == updated);
        if is_timestamp || self.deleted_at_column() == Some(column) {
            return Some(DataType::Date);
        }
        None
    }

    /// Bind a freshly declared definition to `owner`: resolve options against
    /// the connection defaults, add the implicit `id` key when none is
    /// declared, and rebuild type descriptors for the owner.
    pub(crate) fn declare_on(
        self,
        owner: ConnectionId,
        dialect: DatabaseBackend,
        defaults: &DefineOptions,
    ) -> Result<Self, OverlayError> {
        let primary_keys = self.attributes.values().filter(|a| a.primary_key).count();
        if primary_keys > 1 {
            return Err(OverlayError::config(format!(
                "model {} declares {primary_keys} primary keys; composite keys are not supported",
                self.name
            )));
        }

        let mut attributes = self.attributes;
        if primary_keys == 0 {
            attributes.insert(
                "id".to_string(),
                AttributeDef::new(DataType::Integer)
                    .primary_key()
                    .auto_increment(),
            );
        }

        Ok(Self {
            name: self.name,
            attributes: attributes
                .iter()
                .map(|(name, attr)| (name.clone(), attr.rebuild_for(owner, dialect)))
                .collect(),
            options: Some(self.options.unwrap_or_else(|| defaults.clone())),
            owner: Some(owner),
        })
    }

    /// Deep copy bound to another connection. Shares nothing with `self`.
    pub fn mirror_for(&self, owner: ConnectionId, dialect: DatabaseBackend) -> Self {
        Self {
            name: self.name.clone(),
            attributes: self
                .attributes
                .iter()
                .map(|(name, attr)| (name.clone(), attr.rebuild_for(owner, dialect)))
                .collect(),
            options: Some(self.options().clone()),
            owner: Some(owner),
        }
    }
}
