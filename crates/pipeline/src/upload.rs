//! Retrying uploads of staged files.

use crate::DestinationKey;
use crate::error::{ErrorKind, Result, transient};
use crate::retry::RetryPolicy;
use ferry_storage::BackendHandle;
use std::path::Path;

/// Pushes one staged file to its destination key.
///
/// The local file is only ever read. Nothing is done about partially
/// written remote objects; the store's own upload atomicity covers them.
#[derive(Clone)]
pub struct RetryingUpload {
    backend: BackendHandle,
    policy: RetryPolicy,
}

impl RetryingUpload {
    pub fn new(backend: BackendHandle, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub async fn upload(&self, local: &Path, key: &DestinationKey) -> Result<()> {
        let what = format!("upload {key}");
        self.policy
            .run(&what, |attempt| async move {
                tracing::debug!(backend = self.backend.name(), %key, attempt, "Uploading");
                self.backend.upload(local, key.as_str()).await.map_err(transient)
            })
            .await
            .map_err(|state| {
                state.exhausted(|attempts, cause| ErrorKind::Upload { key: key.to_string(), attempts, cause })
            })
    }
}
