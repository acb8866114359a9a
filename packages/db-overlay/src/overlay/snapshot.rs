//! File-backed shadow databases.
//!
//! Each namespace owns one directory below the temp root holding a template
//! (`backup.db`) and the copy tests mutate (`working.db`). Restoring a test's
//! starting state is a file copy instead of a rebuild.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::overlay::OverlayOptions;
use crate::error::OverlayError;
use crate::orm::ConnectionHandle;
use crate::overlay::fixtures::{load_fixture_files, FixtureOptions};
use crate::overlay::mirror::copy_current_models;
use crate::overlay::options::adapt_config;

pub const WORKING_FILE: &str = "working.db";
pub const BACKUP_FILE: &str = "backup.db";

/// Namespace directories held by a live manager in this process.
static CLAIMED_DIRS: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/// Paths used by one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLayout {
    root: PathBuf,
    namespace: String,
}

impl SnapshotLayout {
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.namespace)
    }

    pub fn working_path(&self) -> PathBuf {
        self.dir().join(WORKING_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir().join(BACKUP_FILE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Absent,
    TemplateBuilding,
    BackedUp,
    Active,
    TornDown,
}

/// Drives the file protocol for one namespace.
#[derive(Debug)]
pub struct SnapshotManager {
    layout: SnapshotLayout,
    keep_between_runs: bool,
    logging: bool,
    state: SnapshotState,
    restores: u32,
    reused_backup: bool,
    claimed: bool,
}

impl SnapshotManager {
    pub fn new(layout: SnapshotLayout, keep_between_runs: bool, logging: bool) -> Self {
        Self {
            layout,
            keep_between_runs,
            logging,
            state: SnapshotState::Absent,
            restores: 0,
            reused_backup: false,
            claimed: false,
        }
    }

    pub fn layout(&self) -> &SnapshotLayout {
        &self.layout
    }

    pub fn state(&self) -> SnapshotState {
        self.state
    }

    pub fn restore_count(&self) -> u32 {
        self.restores
    }

    /// Whether this manager holds its namespace directory.
    pub fn holds_namespace(&self) -> bool {
        self.claimed
    }

    /// True when setup started from a retained backup instead of fixtures.
    pub fn reused_backup(&self) -> bool {
        self.reused_backup
    }

    pub async fn verify_or_create_temp_root(&self) -> Result<(), OverlayError> {
        let root = self.layout.root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| OverlayError::io("create temp root", root, e))
    }

    /// Empties the namespace directory, creating it if needed.
    pub async fn create_clean_folder(&self) -> Result<(), OverlayError> {
        let dir = self.layout.dir();
        remove_dir_if_exists(&dir).await?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| OverlayError::io("create namespace dir", &dir, e))
    }

    pub async fn backup_exists(&self) -> Result<bool, OverlayError> {
        let backup = self.layout.backup_path();
        tokio::fs::try_exists(&backup)
            .await
            .map_err(|e| OverlayError::io("stat backup", &backup, e))
    }

    /// Copies the working file over the backup. The working database must be
    /// closed.
    pub async fn create_backup(&self) -> Result<(), OverlayError> {
        copy_atomic(&self.layout.working_path(), &self.layout.backup_path()).await
    }

    /// Replaces the working file with a copy of the backup.
    pub async fn restore_backup(&self) -> Result<(), OverlayError> {
        let backup = self.layout.backup_path();
        if !self.backup_exists().await? {
            return Err(OverlayError::io(
                "restore backup",
                &backup,
                std::io::Error::new(ErrorKind::NotFound, "backup file is missing"),
            ));
        }
        remove_file_if_exists(&self.layout.working_path()).await?;
        copy_atomic(&backup, &self.layout.working_path()).await
    }

    /// Builds the shadow connection for `original` in this namespace.
    ///
    /// With retention and an existing backup the backup is reused as is and
    /// only missing tables are created. Otherwise the template is built from
    /// the fixtures, backed up, and a fresh working connection is returned.
    pub async fn setup_database<P: AsRef<Path>>(
        &mut self,
        original: &ConnectionHandle,
        fixtures: &[P],
        options: &OverlayOptions,
    ) -> Result<ConnectionHandle, OverlayError> {
        self.claim_dir()?;
        self.verify_or_create_temp_root().await?;

        self.reused_backup = self.keep_between_runs && self.backup_exists().await?;
        if self.reused_backup {
            let dir = self.layout.dir();
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| OverlayError::io("create namespace dir", &dir, e))?;
            self.restore_backup().await?;
        } else {
            self.state = SnapshotState::TemplateBuilding;
            self.create_clean_folder().await?;
        }

        let shadow = ConnectionHandle::connect(adapt_config(original.config(), options, &self.layout)).await?;
        if let Err(e) = self.build(original, &shadow, fixtures, options).await {
            if let Err(close_err) = shadow.close().await {
                warn!("overlay=setup shadow_close_failed err={}", close_err);
            }
            return Err(e);
        }

        self.state = SnapshotState::Active;
        if self.logging {
            info!(
                "overlay=snapshot namespace={} reused_backup={} path={}",
                self.layout.namespace(),
                self.reused_backup,
                self.layout.working_path().display()
            );
        }
        Ok(shadow)
    }

    async fn build<P: AsRef<Path>>(
        &mut self,
        original: &ConnectionHandle,
        shadow: &ConnectionHandle,
        fixtures: &[P],
        options: &OverlayOptions,
    ) -> Result<(), OverlayError> {
        copy_current_models(original, shadow)?;
        shadow.sync_all().await?;
        if self.reused_backup {
            return Ok(());
        }

        load_fixture_files(shadow, fixtures, &FixtureOptions::from_overlay(options)).await?;
        shadow.close().await?;
        self.create_backup().await?;
        self.state = SnapshotState::BackedUp;
        debug!("overlay=snapshot backup={}", self.layout.backup_path().display());
        shadow.reconnect().await?;
        Ok(())
    }

    /// Resets the working database to the backup. Tables of models declared
    /// after the backup was taken are created again.
    pub async fn restore_from_backup(&mut self, shadow: &ConnectionHandle) -> Result<(), OverlayError> {
        shadow.close().await?;
        self.restore_backup().await?;
        shadow.reconnect().await?;
        shadow.sync_all().await?;
        self.restores += 1;
        self.state = SnapshotState::Active;
        debug!(
            "overlay=restore namespace={} restores={}",
            self.layout.namespace(),
            self.restores
        );
        Ok(())
    }

    /// Closes the shadow and removes this namespace's files; with retention
    /// only the working file goes. Both steps are attempted.
    pub async fn cleanup_database(&mut self, shadow: &ConnectionHandle) -> Result<(), OverlayError> {
        let closed = shadow.close().await;
        let removed = self.discard().await;
        self.state = SnapshotState::TornDown;
        self.release_dir();
        closed?;
        removed
    }

    /// Reserves the namespace directory for this manager. A second live
    /// session on the same directory would wipe or overwrite this one's files.
    fn claim_dir(&mut self) -> Result<(), OverlayError> {
        if self.claimed {
            return Ok(());
        }
        let dir = self.layout.dir();
        if !CLAIMED_DIRS.lock().insert(dir.clone()) {
            return Err(OverlayError::config(format!(
                "namespace '{}' is already in use by a live session ({})",
                self.layout.namespace(),
                dir.display()
            )));
        }
        self.claimed = true;
        Ok(())
    }

    fn release_dir(&mut self) {
        if std::mem::take(&mut self.claimed) {
            CLAIMED_DIRS.lock().remove(&self.layout.dir());
        }
    }

    /// Removes what this namespace leaves behind without touching a
    /// connection.
    pub async fn discard(&self) -> Result<(), OverlayError> {
        if self.keep_between_runs {
            remove_file_if_exists(&self.layout.working_path()).await
        } else {
            remove_dir_if_exists(&self.layout.dir()).await
        }
    }
}

impl Drop for SnapshotManager {
    fn drop(&mut self) {
        self.release_dir();
    }
}

/// Copies `from` to a sibling of `to`, then renames it into place.
async fn copy_atomic(from: &Path, to: &Path) -> Result<(), OverlayError> {
    let mut partial_name = to.file_name().unwrap_or_default().to_os_string();
    partial_name.push(".partial");
    let partial = to.with_file_name(partial_name);

    if let Err(e) = tokio::fs::copy(from, &partial).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(OverlayError::io("copy", from, e));
    }
    tokio::fs::rename(&partial, to)
        .await
        .map_err(|e| OverlayError::io("rename", to, e))
}

async fn remove_file_if_exists(path: &Path) -> Result<(), OverlayError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OverlayError::io("remove file", path, e)),
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), OverlayError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OverlayError::io("remove dir", path, e)),
    }
}
