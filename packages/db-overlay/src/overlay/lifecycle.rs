//! Setup / Restore / Cleanup.
//!
//! A test suite calls [`setup`] once before its tests, [`restore`] before
//! each test and [`cleanup`] once at the end. Between setup and cleanup
//! every statement issued through the original handle lands in the shadow
//! database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::overlay::OverlayOptions;
use crate::error::OverlayError;
use crate::orm::{ActiveBackend, ConnectionHandle, SessionId};
use crate::overlay::fixtures::{load_fixture_files, FixtureOptions};
use crate::overlay::hook::{hook_new_models, unhook_new_models, HookSubscription};
use crate::overlay::mirror::{copy_current_models, unbind_models};
use crate::overlay::options::adapt_config;
use crate::overlay::redirect::{redirect, repoint, unredirect, Redirection};
use crate::overlay::snapshot::{SnapshotLayout, SnapshotManager};

enum ShadowStore {
    File(SnapshotManager),
    /// Rebuilt from the fixtures on every restore.
    Memory { fixtures: Vec<PathBuf> },
}

/// An active overlay on one original handle.
pub struct MockSession {
    id: SessionId,
    original: ConnectionHandle,
    shadow: ConnectionHandle,
    redirection: Option<Redirection>,
    hook: Option<HookSubscription>,
    store: ShadowStore,
    layout: SnapshotLayout,
    options: OverlayOptions,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("id", &self.id)
            .field("original", &self.original.id())
            .field("shadow", &self.shadow.id())
            .field("namespace", &self.layout.namespace())
            .field("file_backed", &self.is_file_backed())
            .finish_non_exhaustive()
    }
}

impl MockSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn original(&self) -> &ConnectionHandle {
        &self.original
    }

    pub fn shadow(&self) -> &ConnectionHandle {
        &self.shadow
    }

    pub fn namespace(&self) -> &str {
        self.layout.namespace()
    }

    pub fn layout(&self) -> &SnapshotLayout {
        &self.layout
    }

    pub fn options(&self) -> &OverlayOptions {
        &self.options
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.store, ShadowStore::File(_))
    }

    /// Backend the original handle will get back at cleanup.
    pub fn displaced_backend(&self) -> Option<&Arc<ActiveBackend>> {
        self.redirection.as_ref().map(Redirection::displaced)
    }

    /// Whether a retained backup was reused instead of loading fixtures.
    pub fn reused_backup(&self) -> bool {
        match &self.store {
            ShadowStore::File(manager) => manager.reused_backup(),
            ShadowStore::Memory { .. } => false,
        }
    }

    pub fn restore_count(&self) -> u32 {
        match &self.store {
            ShadowStore::File(manager) => manager.restore_count(),
            ShadowStore::Memory { .. } => 0,
        }
    }

    fn attach(&mut self) -> Result<(), OverlayError> {
        self.redirection = Some(redirect(&self.original, &self.shadow)?);
        self.hook = Some(hook_new_models(
            &self.original,
            &self.shadow,
            self.options.logging,
        )?);
        Ok(())
    }

    fn detach(&mut self) -> Option<OverlayError> {
        let mut first_error = None;
        if let Some(hook) = self.hook.take() {
            unhook_new_models(&self.original, hook);
        }
        if let Some(redirection) = self.redirection.take() {
            if let Err(e) = unredirect(&self.original, redirection) {
                first_error.get_or_insert(e);
            }
        }
        unbind_models(&self.original);
        self.original.release_session(self.id);
        first_error
    }

    /// Undoes everything setup did. Every step runs; the first error wins.
    async fn teardown(&mut self) -> Result<(), OverlayError> {
        let mut first_error = None;

        let closed = match &mut self.store {
            ShadowStore::File(manager) => manager.cleanup_database(&self.shadow).await,
            ShadowStore::Memory { .. } => self.shadow.close().await,
        };
        if let Err(e) = closed {
            first_error.get_or_insert(e);
        }
        if let Some(e) = self.detach() {
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        // dropped without cleanup: put the original handle back, leave files
        if self.redirection.is_some() || self.hook.is_some() {
            warn!(
                "overlay=drop session={} namespace={} cleanup=skipped",
                self.id,
                self.layout.namespace()
            );
            if let Some(e) = self.detach() {
                warn!("overlay=drop detach_failed err={}", e);
            }
        }
    }
}

/// Substitutes a shadow backend behind `original`.
///
/// Options are validated before anything is touched. On failure every
/// completed step is undone and the original error is returned.
pub async fn setup<P: AsRef<Path>>(
    original: &ConnectionHandle,
    fixtures: &[P],
    options: OverlayOptions,
) -> Result<MockSession, OverlayError> {
    options.validate()?;

    let session_id = SessionId::new();
    original.claim_session(session_id)?;

    let fixtures: Vec<PathBuf> = fixtures.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let layout = SnapshotLayout::new(options.temp_root(), options.resolve_namespace());
    if options.logging {
        info!(
            "overlay=setup session={} namespace={} mode={} fixtures={}",
            session_id,
            layout.namespace(),
            if options.use_from_file_database { "file" } else { "memory" },
            fixtures.len()
        );
    }

    let built = if options.use_from_file_database {
        build_file_shadow(original, &fixtures, &options, &layout).await
    } else {
        build_memory_shadow(original, &fixtures, &options, &layout).await
    };
    let (shadow, store) = match built {
        Ok(built) => built,
        Err(e) => {
            unbind_models(original);
            original.release_session(session_id);
            return Err(e);
        }
    };

    let mut session = MockSession {
        id: session_id,
        original: original.clone(),
        shadow,
        redirection: None,
        hook: None,
        store,
        layout,
        options,
    };
    if let Err(e) = session.attach() {
        if let Err(teardown_err) = session.teardown().await {
            warn!("overlay=setup rollback_failed err={}", teardown_err);
        }
        return Err(e);
    }

    if session.options.logging {
        info!(
            "overlay=setup done session={} shadow={} models={}",
            session.id,
            session.shadow.id(),
            session.shadow.registry().len()
        );
    }
    Ok(session)
}

async fn build_file_shadow(
    original: &ConnectionHandle,
    fixtures: &[PathBuf],
    options: &OverlayOptions,
    layout: &SnapshotLayout,
) -> Result<(ConnectionHandle, ShadowStore), OverlayError> {
    let mut manager = SnapshotManager::new(
        layout.clone(),
        options.keep_database_between_runs,
        options.logging,
    );
    match manager.setup_database(original, fixtures, options).await {
        Ok(shadow) => Ok((shadow, ShadowStore::File(manager))),
        // a namespace held by another session is left alone
        Err(e) if !manager.holds_namespace() => Err(e),
        Err(e) => {
            if let Err(discard_err) = manager.discard().await {
                warn!("overlay=setup discard_failed err={}", discard_err);
            }
            Err(e)
        }
    }
}

async fn build_memory_shadow(
    original: &ConnectionHandle,
    fixtures: &[PathBuf],
    options: &OverlayOptions,
    layout: &SnapshotLayout,
) -> Result<(ConnectionHandle, ShadowStore), OverlayError> {
    let shadow = ConnectionHandle::connect(adapt_config(original.config(), options, layout)).await?;
    let loaded = async {
        copy_current_models(original, &shadow)?;
        shadow.sync_all().await?;
        load_fixture_files(&shadow, fixtures, &FixtureOptions::from_overlay(options)).await
    }
    .await;
    match loaded {
        Ok(_) => Ok((
            shadow,
            ShadowStore::Memory {
                fixtures: fixtures.to_vec(),
            },
        )),
        Err(e) => {
            if let Err(close_err) = shadow.close().await {
                warn!("overlay=setup shadow_close_failed err={}", close_err);
            }
            Err(e)
        }
    }
}

/// Resets the shadow to its post-setup state.
///
/// A failure recorded by the live definition hook since the last phase is
/// returned first.
pub async fn restore(session: &mut MockSession) -> Result<(), OverlayError> {
    if let Some(failure) = session.hook.as_ref().and_then(HookSubscription::take_failure) {
        return Err(failure);
    }

    match &mut session.store {
        ShadowStore::File(manager) => {
            manager.restore_from_backup(&session.shadow).await?;
            repoint(&session.original, &session.shadow)?;
        }
        ShadowStore::Memory { fixtures } => {
            session.shadow.drop_all().await?;
            session.shadow.sync_all().await?;
            load_fixture_files(
                &session.shadow,
                fixtures.as_slice(),
                &FixtureOptions::from_overlay(&session.options),
            )
            .await?;
        }
    }

    if session.options.logging {
        info!(
            "overlay=restore session={} namespace={}",
            session.id,
            session.layout.namespace()
        );
    }
    Ok(())
}

/// Removes the overlay and hands the original its backend back.
///
/// Every teardown step is attempted. A recorded live-mirror failure takes
/// precedence over teardown errors.
pub async fn cleanup(mut session: MockSession) -> Result<(), OverlayError> {
    let failure = session.hook.as_ref().and_then(HookSubscription::take_failure);
    let result = session.teardown().await;

    if session.options.logging {
        info!(
            "overlay=cleanup session={} namespace={} ok={}",
            session.id,
            session.layout.namespace(),
            failure.is_none() && result.is_ok()
        );
    }

    match (failure, result) {
        (Some(failure), Err(e)) => {
            warn!("overlay=cleanup teardown_failed err={}", e);
            Err(failure)
        }
        (Some(failure), Ok(())) => Err(failure),
        (None, result) => result,
    }
}
