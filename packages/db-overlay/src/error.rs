use std::path::{Path, PathBuf};

use thiserror::Error;

/// Every failure the overlay can report.
///
/// All lifecycle phases return this type so a test-framework adapter can fail
/// the hook it is running in.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("Configuration error: {detail}")]
    Config { detail: String },
    #[error("I/O error: {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Database error: {detail}")]
    Db { detail: String },
    #[error("Fixture error: {detail}")]
    Fixture { detail: String },
    #[error("Unknown model: {name}")]
    UnknownModel { name: String },
    #[error("Invalid record for {model}.{field}: {detail}")]
    InvalidRecord {
        model: String,
        field: String,
        detail: String,
    },
    #[error("Redirect error: {detail}")]
    Redirect { detail: String },
    #[error("Hook error: {detail}")]
    Hook { detail: String },
    #[error("Live mirroring of model {model} failed: {detail}")]
    LiveMirror { model: String, detail: String },
}

impl OverlayError {
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn db(detail: impl Into<String>) -> Self {
        Self::Db {
            detail: detail.into(),
        }
    }

    pub fn fixture(detail: impl Into<String>) -> Self {
        Self::Fixture {
            detail: detail.into(),
        }
    }

    pub fn unknown_model(name: impl Into<String>) -> Self {
        Self::UnknownModel { name: name.into() }
    }

    pub fn invalid_record(
        model: impl Into<String>,
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidRecord {
            model: model.into(),
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub fn redirect(detail: impl Into<String>) -> Self {
        Self::Redirect {
            detail: detail.into(),
        }
    }

    pub fn hook(detail: impl Into<String>) -> Self {
        Self::Hook {
            detail: detail.into(),
        }
    }

    pub fn live_mirror(model: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::LiveMirror {
            model: model.into(),
            detail: detail.into(),
        }
    }

    /// True for errors raised before anything was mutated.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<sea_orm::DbErr> for OverlayError {
    fn from(e: sea_orm::DbErr) -> Self {
        OverlayError::db(e.to_string())
    }
}

impl From<sea_orm::sea_query::error::Error> for OverlayError {
    fn from(e: sea_orm::sea_query::error::Error) -> Self {
        OverlayError::db(format!("statement build failed: {e}"))
    }
}

impl From<sqlx::Error> for OverlayError {
    fn from(e: sqlx::Error) -> Self {
        OverlayError::db(e.to_string())
    }
}
