//! Storage models.
//!
//! These types represent destination object metadata returned by
//! [`StorageBackend::stat()`](crate::StorageBackend::stat).

/// Object metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full key of the object, as it exists in the store.
    pub key: String,
    /// Object size in bytes
    pub size: u64,
}
impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self { key: key.into(), size }
    }
}
