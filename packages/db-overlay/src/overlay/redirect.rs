use std::sync::Arc;

use tracing::debug;

use crate::error::OverlayError;
use crate::orm::{ActiveBackend, ConnectionHandle, ConnectionId};

/// Proof of a redirect; holds the backend it displaced.
#[derive(Debug)]
pub struct Redirection {
    shadow: ConnectionId,
    displaced: Arc<ActiveBackend>,
}

impl Redirection {
    pub fn shadow(&self) -> ConnectionId {
        self.shadow
    }

    pub fn displaced(&self) -> &Arc<ActiveBackend> {
        &self.displaced
    }
}

/// Points `original` at `shadow`'s current backend.
pub fn redirect(original: &ConnectionHandle, shadow: &ConnectionHandle) -> Result<Redirection, OverlayError> {
    if original.ptr_eq(shadow) {
        return Err(OverlayError::redirect("cannot redirect a connection to itself"));
    }
    if let Some(current) = original.redirected_to() {
        return Err(OverlayError::redirect(format!(
            "connection {} is already redirected to {current}",
            original.id()
        )));
    }
    original.set_redirect(Some(shadow.id()));
    let displaced = original.swap_backend(shadow.active_backend());
    debug!(
        "redirect=on original={} shadow={} displaced_backend={}",
        original.id(),
        shadow.id(),
        displaced.id()
    );
    Ok(Redirection {
        shadow: shadow.id(),
        displaced,
    })
}

/// Re-points an already redirected `original` at `shadow`'s current backend,
/// after the shadow has reconnected.
pub fn repoint(original: &ConnectionHandle, shadow: &ConnectionHandle) -> Result<(), OverlayError> {
    if original.redirected_to() != Some(shadow.id()) {
        return Err(OverlayError::redirect(format!(
            "connection {} is not redirected to {}",
            original.id(),
            shadow.id()
        )));
    }
    original.swap_backend(shadow.active_backend());
    Ok(())
}

/// Puts the displaced backend back and clears the redirect.
pub fn unredirect(original: &ConnectionHandle, redirection: Redirection) -> Result<(), OverlayError> {
    if original.redirected_to() != Some(redirection.shadow) {
        return Err(OverlayError::redirect(format!(
            "connection {} is not redirected to {}",
            original.id(),
            redirection.shadow
        )));
    }
    let backend_id = redirection.displaced.id();
    original.swap_backend(redirection.displaced);
    original.set_redirect(None);
    debug!("redirect=off original={} backend={}", original.id(), backend_id);
    Ok(())
}
