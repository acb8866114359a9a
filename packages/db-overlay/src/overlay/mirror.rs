use std::sync::Arc;

use tracing::debug;

use crate::error::OverlayError;
use crate::orm::{ConnectionHandle, ModelDefinition};

/// Registers a copy of `source` on `target`.
///
/// Attributes and options are cloned and every type descriptor is rebuilt
/// for `target`, so nothing in the copy refers back to the source connection.
pub fn copy_model(target: &ConnectionHandle, source: &ModelDefinition) -> Arc<ModelDefinition> {
    let mirrored = source.mirror_for(target.id(), target.config().backend());
    debug!(
        "mirror=copy model={} from={:?} to={}",
        source.name(),
        source.owner(),
        target.id()
    );
    target.register(mirrored)
}

/// Mirrors every model of `original` into `shadow` and binds each original
/// entry to its mirror. Returns the number of mirrored models.
pub fn copy_current_models(original: &ConnectionHandle, shadow: &ConnectionHandle) -> Result<usize, OverlayError> {
    let definitions = original.registry().definitions();
    for definition in &definitions {
        let mirrored = copy_model(shadow, definition);
        original.registry().bind(definition.name(), mirrored)?;
    }
    Ok(definitions.len())
}

/// Drops every binding from `original`'s registry.
pub fn unbind_models(original: &ConnectionHandle) -> usize {
    original.registry().unbind_all()
}
