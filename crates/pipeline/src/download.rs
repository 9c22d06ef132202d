//! Restart-from-zero downloads into the staging area.

use crate::error::{ErrorKind, Result, transient};
use crate::event::{EventSink, TransferEvent};
use crate::retry::RetryPolicy;
use crate::staging;
use exn::ResultExt;
use ferry_source::{SourceHandle, SourceNode};
use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Fetches one leaf to a local staging path.
///
/// Every attempt starts from byte zero on a fresh connection: whatever an
/// earlier attempt left in the staging path is deleted first, and a failed
/// attempt deletes its partial file before the next one begins. When every
/// attempt fails, the staging path is guaranteed to be absent.
#[derive(Clone)]
pub struct RestartableDownload {
    source: SourceHandle,
    policy: RetryPolicy,
    chunk_size: usize,
    events: EventSink,
}

impl RestartableDownload {
    pub fn new(source: SourceHandle, policy: RetryPolicy, chunk_size: usize, events: EventSink) -> Self {
        Self { source, policy, chunk_size: chunk_size.max(1), events }
    }

    /// Download `leaf` to `staging`, returning the number of bytes written.
    pub async fn fetch(&self, leaf: &SourceNode, staging: &Path) -> Result<u64> {
        let what = format!("download {}", leaf.id);
        let result = self
            .policy
            .run(&what, |attempt| async move {
                tracing::debug!(leaf = %leaf.id, name = %leaf.name, attempt, "Downloading");
                match self.attempt(leaf, staging).await {
                    Ok(bytes) => Ok(bytes),
                    Err(e) => {
                        self.clean(staging).await;
                        Err(e)
                    },
                }
            })
            .await;
        match result {
            Ok(bytes) => Ok(bytes),
            Err(state) => {
                self.clean(staging).await;
                Err(state.exhausted(|attempts, cause| ErrorKind::Download {
                    leaf: leaf.id.to_string(),
                    attempts,
                    cause,
                }))
            },
        }
    }

    async fn attempt(&self, leaf: &SourceNode, staging: &Path) -> Result<u64> {
        staging::remove(staging).await.map_err(|e| transient(exn::Exn::from(e)))?;
        let mut chunks = self.source.open(leaf, self.chunk_size).await.map_err(transient)?;
        let file = File::create(staging).await.map_err(|e| transient(exn::Exn::from(e)))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut bytes = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(transient)?;
            writer.write_all(&chunk).await.map_err(|e| transient(exn::Exn::from(e)))?;
            bytes += chunk.len() as u64;
            self.events.emit(TransferEvent::Progress { leaf: leaf.id.clone(), bytes, total: leaf.size });
        }
        writer.flush().await.map_err(|e| transient(exn::Exn::from(e)))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .or_raise(|| ErrorKind::Transient(format!("syncing {}", staging.display())))?;
        if let Some(expected) = leaf.size
            && expected != bytes
        {
            exn::bail!(ErrorKind::Transient(format!("truncated download: got {bytes} of {expected} bytes")));
        }
        Ok(bytes)
    }

    async fn clean(&self, staging: &Path) {
        if let Err(e) = staging::remove(staging).await {
            tracing::warn!(path = %staging.display(), error = %e, "Could not remove partial download");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_source::{NodeId, SourceTree};
    use ferry_source::tree::MockTree;
    use std::sync::Arc;

    fn tree() -> MockTree {
        MockTree::new("root")
            .with_folder("root", "lbl", "running")
            .with_file("lbl", "v1", "vid1.mp4", b"0123456789".to_vec())
    }

    async fn leaf(tree: &MockTree) -> SourceNode {
        tree.list_children(&NodeId::from("lbl")).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_restarts_after_failures() {
        let tree = Arc::new(tree().with_failing_downloads("v1", 2));
        let leaf = leaf(&tree).await;
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("v1_vid1.mp4");
        let (events, mut receiver) = EventSink::channel(64);

        let download = RestartableDownload::new(tree.clone(), RetryPolicy::immediate(5), 4, events);
        assert_eq!(download.fetch(&leaf, &staging).await.unwrap(), 10);
        assert_eq!(std::fs::read(&staging).unwrap(), b"0123456789");
        assert_eq!(tree.download_attempts("v1").await, 3);

        // Two broken attempts of one chunk each, then a full one of three.
        let mut progress = Vec::new();
        while let Ok(TransferEvent::Progress { bytes, total, .. }) = receiver.try_recv() {
            assert_eq!(total, Some(10));
            progress.push(bytes);
        }
        assert_eq!(progress, [4, 4, 4, 8, 10]);
    }

    #[tokio::test]
    async fn test_exhausted_leaves_no_staging_file() {
        let tree = Arc::new(tree().with_failing_downloads("v1", usize::MAX));
        let leaf = leaf(&tree).await;
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("v1_vid1.mp4");

        let download = RestartableDownload::new(tree.clone(), RetryPolicy::immediate(5), 4, EventSink::disabled());
        let err = download.fetch(&leaf, &staging).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Download { attempts: 5, .. }));
        assert!(!staging.exists());
        assert_eq!(tree.download_attempts("v1").await, 5);
    }

    #[tokio::test]
    async fn test_stale_staging_file_is_replaced() {
        let tree = Arc::new(tree());
        let leaf = leaf(&tree).await;
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("v1_vid1.mp4");
        std::fs::write(&staging, b"stale bytes from an earlier crash, longer than the video").unwrap();

        let download = RestartableDownload::new(tree, RetryPolicy::immediate(1), 1024, EventSink::disabled());
        download.fetch(&leaf, &staging).await.unwrap();
        assert_eq!(std::fs::read(&staging).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_size_mismatch_is_a_failure() {
        let tree = Arc::new(tree());
        let mut leaf = leaf(&tree).await;
        leaf.size = Some(11);
        let tmp = tempfile::tempdir().unwrap();
        let staging = tmp.path().join("v1_vid1.mp4");

        let download = RestartableDownload::new(tree, RetryPolicy::immediate(2), 1024, EventSink::disabled());
        let err = download.fetch(&leaf, &staging).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Download { cause, .. } if cause.starts_with("truncated")));
        assert!(!staging.exists());
    }
}
