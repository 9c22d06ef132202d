//! In-memory storage backend for testing.

use crate::error::{ErrorKind, Result};
use crate::{ObjectInfo, StorageBackend};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct Faults {
    /// Keys whose `stat()` fails with something other than "not found".
    broken_stat: HashSet<String>,
    /// Remaining number of failing uploads, per key.
    failing_uploads: HashMap<String, usize>,
    /// Number of upload calls seen, per key.
    upload_attempts: HashMap<String, usize>,
}

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. Faults
/// can be injected per key to exercise retry and error paths.
///
/// # Examples
///
/// ```
/// use ferry_storage::backend::{MockBackend, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferry_storage::error::Result<()> {
/// let backend = MockBackend::with_objects([
///     ("labels/running/vid1.mp4", b"...".to_vec()),
/// ]);
/// assert_eq!(backend.stat("labels/running/vid1.mp4").await?.size, 3);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    faults: Mutex<Faults>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let map = objects.into_iter().map(|(key, data)| (key.into(), data.into())).collect();
        Self {
            name: "mock".to_string(),
            objects: RwLock::new(map),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every `stat()` of `key` fail with a network error.
    pub fn with_broken_stat(mut self, key: impl Into<String>) -> Self {
        self.faults.get_mut().broken_stat.insert(key.into());
        self
    }

    /// Make the next `times` uploads to `key` fail. Use [`usize::MAX`] for
    /// an upload that never succeeds.
    pub fn with_failing_uploads(mut self, key: impl Into<String>, times: usize) -> Self {
        self.faults.get_mut().failing_uploads.insert(key.into(), times);
        self
    }

    /// Number of times [`upload()`](StorageBackend::upload) was called for `key`.
    pub async fn upload_attempts(&self, key: &str) -> usize {
        self.faults.lock().await.upload_attempts.get(key).copied().unwrap_or(0)
    }

    /// Contents of the object stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let objects: [(String, Vec<u8>); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self, key: &str) -> Result<ObjectInfo> {
        if self.faults.lock().await.broken_stat.contains(key) {
            exn::bail!(ErrorKind::Network(format!("injected stat failure for {key}")));
        }
        let guard = self.objects.read().await;
        let data = guard.get(key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))?;
        Ok(ObjectInfo::new(key, data.len() as u64))
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<()> {
        {
            let mut faults = self.faults.lock().await;
            *faults.upload_attempts.entry(key.to_string()).or_default() += 1;
            if let Some(remaining) = faults.failing_uploads.get_mut(key)
                && *remaining > 0
            {
                *remaining = remaining.saturating_sub(1);
                exn::bail!(ErrorKind::Network(format!("injected upload failure for {key}")));
            }
        }
        let data = tokio::fs::read(local).await.map_err(ErrorKind::Io)?;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }
}
