//! Local filesystem storage backend.
//!
//! This module provides a destination that lays objects out as files in a
//! configured directory, one sub-directory per `/`-separated key segment.
//! Handy for dry runs and for mirroring into a mounted network share.

use crate::error::ErrorKind;
use crate::{ObjectInfo, StorageBackend, error::Result, path::validate as validate_key};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Suffix appended to in-flight uploads. Objects are only renamed into place
/// once fully written.
const PARTIAL_SUFFIX: &str = ".ferry-partial";

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use ferry_storage::backend::LocalBackend;
///
/// # fn example() -> ferry_storage::error::Result<()> {
/// let backend = LocalBackend::new("mirror", "/mnt/datasets/kinetics")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory for the object tree
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but isn't a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root.to_string_lossy()))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Get the absolute path for an object key.
    fn absolute_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }

    fn map_io_error(e: std::io::Error, key: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_string()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self, key: &str) -> Result<ObjectInfo> {
        let abs_path = self.absolute_path(key)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, key))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        Ok(ObjectInfo::new(key, metadata.len()))
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<()> {
        let abs_path = self.absolute_path(key)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, key))?;
        }
        let mut partial = abs_path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);
        if let Err(e) = fs::copy(local, &partial).await {
            _ = fs::remove_file(&partial).await;
            exn::bail!(Self::map_io_error(e, &local.to_string_lossy()));
        }
        Ok(fs::rename(&partial, &abs_path).await.map_err(|e| Self::map_io_error(e, key))?)
    }
}
