use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::error::OverlayError;
use crate::orm::{ConnectionHandle, DefineListener, ModelDefinition, SubscriptionId};
use crate::overlay::mirror::copy_model;

/// Mirrors models declared on the original after setup into the shadow.
struct LiveDefinitionHook {
    shadow: ConnectionHandle,
    logging: bool,
    /// First failure, as (model, detail).
    failure: Mutex<Option<(String, String)>>,
}

impl LiveDefinitionHook {
    async fn mirror(&self, origin: &ConnectionHandle, definition: &ModelDefinition) -> Result<(), OverlayError> {
        let mirrored = copy_model(&self.shadow, definition);
        origin.registry().bind(definition.name(), mirrored)?;
        self.shadow.model(definition.name())?.sync().await
    }
}

#[async_trait]
impl DefineListener for LiveDefinitionHook {
    async fn on_model_defined(
        &self,
        origin: &ConnectionHandle,
        definition: Arc<ModelDefinition>,
    ) -> Result<(), OverlayError> {
        match self.mirror(origin, &definition).await {
            Ok(()) => {
                if self.logging {
                    info!(
                        "overlay=hook model={} table={} mirrored=true",
                        definition.name(),
                        definition.table_name()
                    );
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    "overlay=hook model={} mirrored=false err={}",
                    definition.name(),
                    e
                );
                let detail = e.to_string();
                self.failure
                    .lock()
                    .get_or_insert_with(|| (definition.name().to_string(), detail.clone()));
                Err(OverlayError::live_mirror(definition.name(), detail))
            }
        }
    }
}

/// Live subscription on an original registry. Pass it to
/// [`unhook_new_models`] to remove it.
pub struct HookSubscription {
    id: SubscriptionId,
    hook: Arc<LiveDefinitionHook>,
}

impl std::fmt::Debug for HookSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSubscription")
            .field("id", &self.id)
            .field("shadow", &self.hook.shadow.id())
            .finish()
    }
}

impl HookSubscription {
    /// Takes the first recorded mirroring failure, if any.
    pub fn take_failure(&self) -> Option<OverlayError> {
        self.hook
            .failure
            .lock()
            .take()
            .map(|(model, detail)| OverlayError::live_mirror(model, detail))
    }
}

/// Subscribes to `original`'s "model defined" event so new models are
/// mirrored into `shadow` and get a table there.
pub fn hook_new_models(
    original: &ConnectionHandle,
    shadow: &ConnectionHandle,
    logging: bool,
) -> Result<HookSubscription, OverlayError> {
    let hook = Arc::new(LiveDefinitionHook {
        shadow: shadow.clone(),
        logging,
        failure: Mutex::new(None),
    });
    let id = original.registry().subscribe(hook.clone())?;
    Ok(HookSubscription { id, hook })
}

/// Removes the subscription; afterwards `define` has no overlay side effect.
pub fn unhook_new_models(original: &ConnectionHandle, subscription: HookSubscription) -> bool {
    original.registry().unsubscribe(subscription.id)
}
