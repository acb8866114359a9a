use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use super::{ConnectionHandle, ModelDefinition};
use crate::error::OverlayError;

/// Receives "model defined" events from a [`Registry`].
#[async_trait]
pub trait DefineListener: Send + Sync {
    /// Called by [`ConnectionHandle::define`] after `definition` is registered
    /// on `origin`. An error is returned to the declaring caller.
    async fn on_model_defined(
        &self,
        origin: &ConnectionHandle,
        definition: Arc<ModelDefinition>,
    ) -> Result<(), OverlayError>;
}

/// Token returned by [`Registry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(Ulid);

struct RegistryEntry {
    definition: Arc<ModelDefinition>,
    binding: Option<Arc<ModelDefinition>>,
}

struct ListenerSlot {
    id: SubscriptionId,
    listener: Arc<dyn DefineListener>,
}

/// Model definitions owned by one connection, keyed by model name.
///
/// An entry can be bound to a definition owned by another connection; lookups
/// then resolve to the bound definition.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
    listener: Mutex<Option<ListenerSlot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition`, replacing (and unbinding) any previous entry of
    /// the same name.
    pub(crate) fn insert(&self, definition: Arc<ModelDefinition>) {
        self.entries.write().insert(
            definition.name().to_string(),
            RegistryEntry {
                definition,
                binding: None,
            },
        );
    }

    /// Definition queries should use: the binding when present.
    pub fn get(&self, name: &str) -> Option<Arc<ModelDefinition>> {
        self.entries.read().get(name).map(|entry| {
            entry
                .binding
                .as_ref()
                .unwrap_or(&entry.definition)
                .clone()
        })
    }

    /// Definition as declared on this registry, ignoring bindings.
    pub fn declared(&self, name: &str) -> Option<Arc<ModelDefinition>> {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.definition.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Declared definitions in name order.
    pub fn definitions(&self) -> Vec<Arc<ModelDefinition>> {
        let entries = self.entries.read();
        let mut defs: Vec<Arc<ModelDefinition>> =
            entries.values().map(|e| e.definition.clone()).collect();
        defs.sort_by(|a, b| a.name().cmp(b.name()));
        defs
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub(crate) fn bind(&self, name: &str, target: Arc<ModelDefinition>) -> Result<(), OverlayError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| OverlayError::unknown_model(name))?;
        entry.binding = Some(target);
        Ok(())
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.entries
            .read()
            .get(name)
            .is_some_and(|entry| entry.binding.is_some())
    }

    /// Removes every binding; returns how many were removed.
    pub(crate) fn unbind_all(&self) -> usize {
        let mut entries = self.entries.write();
        entries
            .values_mut()
            .filter_map(|entry| entry.binding.take())
            .count()
    }

    /// Installs the single "model defined" listener.
    pub fn subscribe(&self, listener: Arc<dyn DefineListener>) -> Result<SubscriptionId, OverlayError> {
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return Err(OverlayError::hook(
                "a model-defined listener is already installed on this registry",
            ));
        }
        let id = SubscriptionId(Ulid::new());
        *slot = Some(ListenerSlot { id, listener });
        Ok(id)
    }

    /// Removes the listener if `id` still owns the slot.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut slot = self.listener.lock();
        match slot.as_ref() {
            Some(current) if current.id == id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub(crate) fn listener(&self) -> Option<Arc<dyn DefineListener>> {
        self.listener
            .lock()
            .as_ref()
            .map(|slot| slot.listener.clone())
    }
}
