//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for the destination side of a transfer across different object
//! stores (S3-compatible services, a local directory, an in-memory map for
//! tests).

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::ObjectInfo;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for destination object stores.
///
/// Keys are flat, `/`-separated strings. They are used verbatim by object
/// stores, and validated by filesystem-backed stores so they never escape
/// the store root.
///
/// # Examples
///
/// ```
/// use ferry_storage::{backend::StorageBackend, error::Result};
///
/// async fn size_of_uploaded_video(backend: &dyn StorageBackend) -> Result<u64> {
///     let info = backend.stat("labels/running/vid1.mp4").await?;
///     Ok(info.size)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Get object metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if no object
    /// exists under `key`. Every other failure (credentials, network,
    /// throttling) is reported with a different
    /// [`ErrorKind`](crate::error::ErrorKind) so that callers can tell "absent"
    /// apart from "couldn't ask".
    async fn stat(&self, key: &str) -> Result<ObjectInfo>;

    /// Upload the contents of a local file to `key`.
    ///
    /// # Notes
    /// - The local file is never modified or removed.
    /// - An object only becomes visible under `key` once the upload has
    ///   completed; a failed upload must not leave something that
    ///   [`stat()`](Self::stat) reports as present.
    /// - An existing object under `key` is overwritten.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use ferry_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// backend.upload(Path::new("temp_download/1a2b_vid1.mp4"), "labels/running/vid1.mp4").await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn upload(&self, local: &Path, key: &str) -> Result<()>;
}
