use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sea_orm::{DatabaseBackend, DatabaseConnection, SqlxPostgresConnector, SqlxSqliteConnector};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions as _;
use tracing::{debug, info, trace};

use super::{BackendId, QueryInterface};
use crate::config::db::{ConnectionConfig, DialectConfig, SqliteStorage};
use crate::error::OverlayError;

/// The swappable part of a connection: dialect, pool and query interface.
///
/// Redirecting a handle replaces its `Arc<ActiveBackend>`; comparing those
/// `Arc`s with `Arc::ptr_eq` tells whether two handles share a backend.
pub struct ActiveBackend {
    id: BackendId,
    dialect: DatabaseBackend,
    pool: DatabaseConnection,
    query_interface: QueryInterface,
    description: String,
}

impl fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveBackend")
            .field("id", &self.id)
            .field("dialect", &self.dialect)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl ActiveBackend {
    /// Opens a pool for `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, OverlayError> {
        let pool = match &config.dialect {
            DialectConfig::Sqlite { storage } => build_sqlite_pool(config, storage).await?,
            DialectConfig::Postgres { url } => build_postgres_pool(config, url)?,
        };
        let dialect = config.backend();
        Ok(Self {
            id: BackendId::new(),
            dialect,
            pool,
            query_interface: QueryInterface::new(dialect),
            description: config.describe(),
        })
    }

    pub fn id(&self) -> BackendId {
        self.id
    }

    pub fn dialect(&self) -> DatabaseBackend {
        self.dialect
    }

    pub fn pool(&self) -> &DatabaseConnection {
        &self.pool
    }

    pub fn query_interface(&self) -> &QueryInterface {
        &self.query_interface
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Closes every pooled connection. Statements issued afterwards fail.
    pub async fn close(&self) -> Result<(), OverlayError> {
        self.pool.clone().close().await?;
        debug!("pool=close backend_id={} path={}", self.id, self.description);
        Ok(())
    }
}

/// Ordered per-connection SQL run on every new SQLite connection.
/// Journal mode is set on the connect options, not here.
fn build_session_statements(busy_timeout_ms: u64) -> Vec<String> {
    vec![
        "PRAGMA foreign_keys = ON;".to_string(),
        format!("PRAGMA busy_timeout = {busy_timeout_ms};"),
    ]
}

async fn apply_sqlite_config(
    conn: &mut sqlx::SqliteConnection,
    statements: &[String],
) -> Result<(), sqlx::Error> {
    for stmt in statements {
        sqlx::query(stmt).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn build_sqlite_pool(
    config: &ConnectionConfig,
    storage: &SqliteStorage,
) -> Result<DatabaseConnection, OverlayError> {
    let connect_opts = match storage {
        SqliteStorage::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| OverlayError::db(format!("invalid SQLite connection options: {e}")))?,
        // rollback journal keeps the whole database in one file, so a closed
        // database can be copied byte for byte
        SqliteStorage::File(path) => SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete),
    };
    let connect_opts = if config.sqlx_logging {
        connect_opts
    } else {
        connect_opts.disable_statement_logging()
    };

    let in_memory = matches!(storage, SqliteStorage::Memory);
    // the in-memory database lives only while a connection to it is open
    let (pool_min, pool_max) = if in_memory {
        (1, 1)
    } else {
        (config.pool.pool_min, config.pool.pool_max.max(1))
    };

    let statements = build_session_statements(config.busy_timeout_ms);
    let mut pool_opts = SqlitePoolOptions::new()
        .min_connections(pool_min)
        .max_connections(pool_max)
        .acquire_timeout(Duration::from_millis(config.pool.acquire_timeout_ms))
        .after_connect(move |conn, _meta| {
            let statements = statements.clone();
            Box::pin(async move {
                apply_sqlite_config(conn, &statements).await?;
                trace!("db=sqlite hook=after_connect ok");
                Ok::<_, sqlx::Error>(())
            })
        });
    if in_memory {
        pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
    }

    let pool: SqlitePool = pool_opts
        .connect_with(connect_opts)
        .await
        .map_err(|e| OverlayError::db(format!("failed to create SQLite connection pool: {e}")))?;

    // warm-up to ensure hook ran on initial connection(s)
    if pool_min > 0 {
        let mut conn = pool.acquire().await.map_err(|e| {
            OverlayError::db(format!("connection acquisition failed during warmup: {e}"))
        })?;
        sqlx::query("SELECT 1;")
            .execute(&mut *conn)
            .await
            .map_err(|e| OverlayError::db(format!("warmup query failed: {e}")))?;
    }

    log_pool_created(config, "sqlite", pool_min, pool_max);
    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// Postgres pools connect lazily: building one never contacts the server.
fn build_postgres_pool(config: &ConnectionConfig, url: &str) -> Result<DatabaseConnection, OverlayError> {
    let pool = PgPoolOptions::new()
        .min_connections(config.pool.pool_min)
        .max_connections(config.pool.pool_max.max(1))
        .acquire_timeout(Duration::from_millis(config.pool.acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(30))
        .connect_lazy(url)
        .map_err(|e| OverlayError::db(format!("invalid Postgres connection options: {e}")))?;

    log_pool_created(config, "postgres", config.pool.pool_min, config.pool.pool_max);
    Ok(SqlxPostgresConnector::from_sqlx_postgres_pool(pool))
}

/// Pool creation is an `info` line only for connections with logging on.
/// Shadows reconnect on every restore, so a quiet overlay keeps it at `debug`.
fn log_pool_created(config: &ConnectionConfig, engine: &str, min: u32, max: u32) {
    if config.sqlx_logging {
        info!(
            "pool=create engine={} path={} min={} max={} acquire_timeout_ms={}",
            engine,
            config.describe(),
            min,
            max,
            config.pool.acquire_timeout_ms
        );
    } else {
        debug!(
            "pool=create engine={} path={} min={} max={}",
            engine,
            config.describe(),
            min,
            max
        );
    }
}
