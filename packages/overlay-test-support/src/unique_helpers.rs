//! Helpers for generating unique test data
//!
//! Overlay namespaces map to directories under the shared temp root, so tests
//! running in parallel must never pick the same one.

use ulid::Ulid;

/// Generate a unique string with the given prefix, in the format `{prefix}-{ulid}`
///
/// # Examples
/// ```
/// use overlay_test_support::unique_str;
///
/// let id1 = unique_str("item");
/// let id2 = unique_str("item");
/// assert_ne!(id1, id2);
/// assert!(id1.starts_with("item-"));
/// ```
pub fn unique_str(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}

/// Generate a namespace that is a valid single path component.
///
/// ULIDs are upper-case; namespaces are lower-cased so they read well on
/// case-insensitive filesystems too.
pub fn unique_namespace(prefix: &str) -> String {
    unique_str(prefix).to_lowercase()
}
