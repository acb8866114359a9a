use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sea_orm::DatabaseBackend;
use tracing::debug;

use super::{ActiveBackend, ConnectionId, ModelDefinition, ModelHandle, Registry, SessionId};
use crate::config::db::ConnectionConfig;
use crate::error::OverlayError;

/// Overlay bookkeeping carried by a handle.
#[derive(Debug, Default)]
struct OverlaySlot {
    session: Option<SessionId>,
    redirected_to: Option<ConnectionId>,
}

struct ConnectionInner {
    id: ConnectionId,
    config: ConnectionConfig,
    registry: Registry,
    backend: RwLock<Arc<ActiveBackend>>,
    overlay: Mutex<OverlaySlot>,
}

/// Handle to a connection and its model registry.
///
/// Clones share identity. The backend a handle issues statements to can be
/// swapped without touching identity or registry; models resolved through
/// [`ConnectionHandle::model`] always use the current backend.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("database", &self.inner.config.database)
            .field("models", &self.inner.registry.names())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub async fn connect(config: ConnectionConfig) -> Result<Self, OverlayError> {
        let backend = ActiveBackend::connect(&config).await?;
        let handle = Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::new(),
                config,
                registry: Registry::new(),
                backend: RwLock::new(Arc::new(backend)),
                overlay: Mutex::new(OverlaySlot::default()),
            }),
        };
        debug!(
            "connection=open id={} path={}",
            handle.id(),
            handle.config().describe()
        );
        Ok(handle)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Backend statements currently go to.
    pub fn active_backend(&self) -> Arc<ActiveBackend> {
        self.inner.backend.read().clone()
    }

    /// Dialect of the current backend; differs from the configured one while
    /// the handle is redirected.
    pub fn dialect(&self) -> DatabaseBackend {
        self.inner.backend.read().dialect()
    }

    pub fn ptr_eq(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Declares a model and notifies the "model defined" listener, if any.
    ///
    /// The model stays registered even when the listener fails; the listener's
    /// error is returned.
    pub async fn define(&self, definition: ModelDefinition) -> Result<Arc<ModelDefinition>, OverlayError> {
        let declared = definition.declare_on(
            self.id(),
            self.config().backend(),
            &self.config().define,
        )?;
        let declared = self.register(declared);
        debug!(
            "model=define name={} table={} connection={}",
            declared.name(),
            declared.table_name(),
            self.id()
        );

        if let Some(listener) = self.registry().listener() {
            listener.on_model_defined(self, declared.clone()).await?;
        }
        Ok(declared)
    }

    /// Registers an already bound definition without notifying listeners.
    pub(crate) fn register(&self, definition: ModelDefinition) -> Arc<ModelDefinition> {
        let definition = Arc::new(definition);
        self.registry().insert(definition.clone());
        definition
    }

    pub fn model(&self, name: &str) -> Result<ModelHandle, OverlayError> {
        if !self.registry().contains(name) {
            return Err(OverlayError::unknown_model(name));
        }
        Ok(ModelHandle::new(self.clone(), name))
    }

    /// Creates missing tables for every registered model.
    pub async fn sync_all(&self) -> Result<(), OverlayError> {
        for name in self.registry().names() {
            self.model(&name)?.sync().await?;
        }
        Ok(())
    }

    pub async fn drop_all(&self) -> Result<(), OverlayError> {
        for name in self.registry().names() {
            self.model(&name)?.drop_table().await?;
        }
        Ok(())
    }

    /// Closes the current backend's pool.
    pub async fn close(&self) -> Result<(), OverlayError> {
        self.active_backend().close().await
    }

    /// Opens a new backend from this handle's configuration and swaps it in.
    /// Returns the replaced backend, which is not closed.
    pub async fn reconnect(&self) -> Result<Arc<ActiveBackend>, OverlayError> {
        let backend = ActiveBackend::connect(self.config()).await?;
        Ok(self.swap_backend(Arc::new(backend)))
    }

    pub(crate) fn swap_backend(&self, backend: Arc<ActiveBackend>) -> Arc<ActiveBackend> {
        std::mem::replace(&mut *self.inner.backend.write(), backend)
    }

    /// Shadow connection currently redirecting this handle.
    pub fn redirected_to(&self) -> Option<ConnectionId> {
        self.inner.overlay.lock().redirected_to
    }

    pub(crate) fn set_redirect(&self, target: Option<ConnectionId>) {
        self.inner.overlay.lock().redirected_to = target;
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.inner.overlay.lock().session
    }

    pub(crate) fn claim_session(&self, session: SessionId) -> Result<(), OverlayError> {
        let mut slot = self.inner.overlay.lock();
        if let Some(active) = slot.session {
            return Err(OverlayError::redirect(format!(
                "connection {} already has an active overlay session {active}",
                self.id()
            )));
        }
        slot.session = Some(session);
        Ok(())
    }

    pub(crate) fn release_session(&self, session: SessionId) {
        let mut slot = self.inner.overlay.lock();
        if slot.session == Some(session) {
            slot.session = None;
        }
    }
}
