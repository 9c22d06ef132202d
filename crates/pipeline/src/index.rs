//! Destination existence checks.

use crate::DestinationKey;
use crate::error::{ErrorKind, Result};
use ferry_storage::BackendHandle;

/// Answers "is this key already in the destination?".
///
/// Only a definite "not found" counts as absent. Any other failure is
/// surfaced as [`ErrorKind::Check`] and never retried here, so a flaky store
/// can't make an existing object look missing.
#[derive(Clone)]
pub struct DestinationIndex {
    backend: BackendHandle,
}

impl DestinationIndex {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    pub async fn exists(&self, key: &DestinationKey) -> Result<bool> {
        match self.backend.stat(key.as_str()).await {
            Ok(info) => {
                tracing::trace!(backend = self.backend.name(), %key, size = info.size, "Key exists");
                Ok(true)
            },
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.raise(ErrorKind::Check(key.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_storage::backend::MockBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_exists() {
        let backend =
            MockBackend::with_objects([("labels/a/one.mp4", b"1".to_vec())]).with_broken_stat("labels/a/bad.mp4");
        let index = DestinationIndex::new(Arc::new(backend));
        assert!(index.exists(&DestinationKey::new("labels", "a", "one.mp4")).await.unwrap());
        assert!(!index.exists(&DestinationKey::new("labels", "a", "two.mp4")).await.unwrap());
        let err = index.exists(&DestinationKey::new("labels", "a", "bad.mp4")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Check(key) if key == "labels/a/bad.mp4"));
    }
}
