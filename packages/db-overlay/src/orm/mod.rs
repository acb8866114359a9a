//! Minimal dynamic data-access layer wrapped by the overlay.
//!
//! A [`ConnectionHandle`] owns a [`Registry`] of [`ModelDefinition`]s and
//! points at an [`ActiveBackend`]; the pointer can be swapped without the
//! handle's identity changing.

use std::fmt::{Display, Formatter, Result as FmtResult};

use ulid::Ulid;

pub mod backend;
pub mod connection;
pub mod model;
pub mod model_handle;
pub mod query;
pub mod registry;

pub use backend::ActiveBackend;
pub use connection::ConnectionHandle;
pub use model::{AttributeDef, DataType, DefineOptions, ModelDefinition, TypeBinding, TypeDescriptor};
pub use model_handle::ModelHandle;
pub use query::QueryInterface;
pub use registry::{DefineListener, Registry, SubscriptionId};

/// Raw record exchanged with models: column name → JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Ulid);

        impl $name {
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                write!(f, "{}", self.0)
            }
        }
    };
}

ulid_id!(
    /// Identity of a [`ConnectionHandle`], stable for its whole lifetime.
    ConnectionId
);
ulid_id!(
    /// Identity of one opened [`ActiveBackend`].
    BackendId
);
ulid_id!(
    /// Identity of one overlay session attached to a handle.
    SessionId
);
