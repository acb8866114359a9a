//! Test-time overlay: substitutes a disposable SQLite backend behind an
//! existing [`crate::ConnectionHandle`] and puts the original back afterwards.

pub mod fixtures;
pub mod hook;
pub mod lifecycle;
pub mod mirror;
pub mod options;
pub mod redirect;
pub mod snapshot;
