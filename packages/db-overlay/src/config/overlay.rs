use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ulid::Ulid;

use crate::error::OverlayError;
use crate::orm::Record;

/// Relative directory holding one sub-directory per namespace.
pub const DEFAULT_TEMP_ROOT: &str = ".db-overlay-temp";

/// Hook applied to every raw fixture record before it is inserted.
/// Receives the model name and the record's data.
pub type FixtureTransform = Arc<dyn Fn(&str, Record) -> Result<Record, OverlayError> + Send + Sync>;

/// Options recognized by [`crate::setup`].
#[derive(Clone)]
pub struct OverlayOptions {
    /// Emit progress lines and statement logging.
    pub logging: bool,
    /// Directory name under the temp root; a fresh id when unset. Only one
    /// live file-backed session per process may use a namespace; setup of a
    /// second one fails with a configuration error. Other processes are not
    /// checked.
    pub namespace: Option<String>,
    /// Keep `backup.db` after cleanup and reuse it on the next run.
    pub keep_database_between_runs: bool,
    /// File-backed snapshot mode when true, in-memory rebuild mode otherwise.
    pub use_from_file_database: bool,
    pub transform_fixture_data: Option<FixtureTransform>,
    pub temp_root: Option<PathBuf>,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            logging: true,
            namespace: None,
            keep_database_between_runs: false,
            use_from_file_database: true,
            transform_fixture_data: None,
            temp_root: None,
        }
    }
}

impl fmt::Debug for OverlayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayOptions")
            .field("logging", &self.logging)
            .field("namespace", &self.namespace)
            .field(
                "keep_database_between_runs",
                &self.keep_database_between_runs,
            )
            .field("use_from_file_database", &self.use_from_file_database)
            .field(
                "transform_fixture_data",
                &self.transform_fixture_data.as_ref().map(|_| "<fn>"),
            )
            .field("temp_root", &self.temp_root)
            .finish()
    }
}

impl OverlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn keep_database_between_runs(mut self, keep: bool) -> Self {
        self.keep_database_between_runs = keep;
        self
    }

    pub fn use_from_file_database(mut self, use_file: bool) -> Self {
        self.use_from_file_database = use_file;
        self
    }

    pub fn with_fixture_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str, Record) -> Result<Record, OverlayError> + Send + Sync + 'static,
    {
        self.transform_fixture_data = Some(Arc::new(transform));
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Read options from `DB_OVERLAY_*` environment variables, falling back to
    /// the defaults for anything unset.
    pub fn from_env() -> Result<Self, OverlayError> {
        let mut options = Self::default();
        if let Some(logging) = bool_var("DB_OVERLAY_LOGGING")? {
            options.logging = logging;
        }
        if let Ok(namespace) = env::var("DB_OVERLAY_NAMESPACE") {
            options.namespace = Some(namespace);
        }
        if let Some(keep) = bool_var("DB_OVERLAY_KEEP_BETWEEN_RUNS")? {
            options.keep_database_between_runs = keep;
        }
        if let Some(use_file) = bool_var("DB_OVERLAY_USE_FILE_DATABASE")? {
            options.use_from_file_database = use_file;
        }
        if let Ok(root) = env::var("DB_OVERLAY_TEMP_ROOT") {
            options.temp_root = Some(PathBuf::from(root));
        }
        Ok(options)
    }

    /// Reject inconsistent options. Runs before anything touches the
    /// filesystem or the original connection.
    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.keep_database_between_runs && self.namespace.is_none() {
            return Err(OverlayError::config(
                "keep_database_between_runs requires an explicit namespace",
            ));
        }
        if self.keep_database_between_runs && !self.use_from_file_database {
            return Err(OverlayError::config(
                "keep_database_between_runs requires use_from_file_database",
            ));
        }
        if let Some(namespace) = &self.namespace {
            validate_namespace(namespace)?;
        }
        Ok(())
    }

    pub fn resolve_namespace(&self) -> String {
        self.namespace
            .clone()
            .unwrap_or_else(|| Ulid::new().to_string().to_lowercase())
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_ROOT))
    }
}

/// A namespace names exactly one directory below the temp root; cleanup
/// removes that directory recursively.
pub fn validate_namespace(namespace: &str) -> Result<(), OverlayError> {
    if namespace.is_empty() || namespace == "." || namespace == ".." {
        return Err(OverlayError::config(format!(
            "invalid namespace '{namespace}'"
        )));
    }
    if namespace.contains(['/', '\\', '\0']) {
        return Err(OverlayError::config(format!(
            "namespace '{namespace}' must be a single path component"
        )));
    }
    Ok(())
}

fn bool_var(name: &str) -> Result<Option<bool>, OverlayError> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(OverlayError::config(format!(
            "environment variable '{name}' must be a boolean, got '{raw}'"
        ))),
    }
}
