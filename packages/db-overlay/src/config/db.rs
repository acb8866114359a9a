use std::path::{Path, PathBuf};

use sea_orm::DatabaseBackend;

use crate::orm::model::DefineOptions;

/// Where an SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteStorage {
    Memory,
    File(PathBuf),
}

/// Engine-specific part of a connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialectConfig {
    Sqlite { storage: SqliteStorage },
    Postgres { url: String },
}

/// Pool sizing, same knobs for every engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub pool_min: u32,
    pub pool_max: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_min: 1,
            pool_max: 5,
            acquire_timeout_ms: 2000,
        }
    }
}

/// Everything needed to open a backend for a [`crate::ConnectionHandle`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub database: String,
    pub dialect: DialectConfig,
    pub pool: PoolSettings,
    /// Defaults applied to models declared on the connection.
    pub define: DefineOptions,
    /// Statement logging, and pool lifecycle lines at `info` instead of `debug`.
    pub sqlx_logging: bool,
    pub busy_timeout_ms: u64,
}

impl ConnectionConfig {
    fn with_dialect(database: &str, dialect: DialectConfig) -> Self {
        Self {
            database: database.to_string(),
            dialect,
            pool: PoolSettings::default(),
            define: DefineOptions::default(),
            sqlx_logging: false,
            busy_timeout_ms: 5000,
        }
    }

    pub fn sqlite_memory() -> Self {
        Self::with_dialect(
            "main",
            DialectConfig::Sqlite {
                storage: SqliteStorage::Memory,
            },
        )
    }

    pub fn sqlite_file(path: impl AsRef<Path>) -> Self {
        Self::with_dialect(
            "main",
            DialectConfig::Sqlite {
                storage: SqliteStorage::File(path.as_ref().to_path_buf()),
            },
        )
    }

    /// Postgres connections are opened lazily; no server is contacted until
    /// the first statement runs.
    pub fn postgres(url: impl Into<String>) -> Self {
        let url = url.into();
        let database = url
            .rsplit('/')
            .next()
            .and_then(|tail| tail.split('?').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("postgres")
            .to_string();
        Self::with_dialect(&database, DialectConfig::Postgres { url }).with_pool(PoolSettings {
            pool_min: 0,
            ..PoolSettings::default()
        })
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_define(mut self, define: DefineOptions) -> Self {
        self.define = define;
        self
    }

    pub fn with_sqlx_logging(mut self, enabled: bool) -> Self {
        self.sqlx_logging = enabled;
        self
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self.dialect {
            DialectConfig::Sqlite { .. } => DatabaseBackend::Sqlite,
            DialectConfig::Postgres { .. } => DatabaseBackend::Postgres,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(
            self.dialect,
            DialectConfig::Sqlite {
                storage: SqliteStorage::Memory
            }
        )
    }

    /// File backing this connection, if any.
    pub fn sqlite_path(&self) -> Option<&Path> {
        match &self.dialect {
            DialectConfig::Sqlite {
                storage: SqliteStorage::File(path),
            } => Some(path.as_path()),
            _ => None,
        }
    }

    /// Password-free description for logs.
    pub fn describe(&self) -> String {
        match &self.dialect {
            DialectConfig::Sqlite {
                storage: SqliteStorage::Memory,
            } => "sqlite::memory:".to_string(),
            DialectConfig::Sqlite {
                storage: SqliteStorage::File(path),
            } => format!("sqlite://{}", path.display()),
            DialectConfig::Postgres { url } => sanitize_db_url(url),
        }
    }
}

/// Sanitize database URL by masking the password in connection strings.
pub fn sanitize_db_url(url: &str) -> String {
    let Some((auth_part, host_part)) = url.split_once('@') else {
        return url.to_string();
    };
    if host_part.contains('@') {
        return url.to_string();
    }
    match auth_part.rfind(':') {
        Some(colon_pos) if auth_part[..colon_pos].contains("://") => {
            format!("{}:***@{}", &auth_part[..colon_pos], host_part)
        }
        _ => url.to_string(),
    }
}
