//! One leaf, end to end.

use crate::download::RestartableDownload;
use crate::error::ErrorKind;
use crate::index::DestinationIndex;
use crate::staging::{StagingArea, StagingFile};
use crate::upload::RetryingUpload;
use crate::{Context, DestinationKey, Outcome, TaskReport};
use ferry_source::SourceNode;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything needed to move one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub leaf: SourceNode,
    pub label: String,
    pub key: DestinationKey,
    pub staging: PathBuf,
}

impl TransferTask {
    pub fn new(ctx: &Context, staging: &StagingArea, label: &str, leaf: SourceNode) -> Self {
        Self {
            key: DestinationKey::new(&ctx.settings.base_prefix, label, &leaf.name),
            staging: staging.path_for(&leaf),
            label: label.to_string(),
            leaf,
        }
    }

    pub fn report(&self, outcome: Outcome, reason: impl Into<String>) -> TaskReport {
        TaskReport {
            leaf: self.leaf.id.clone(),
            name: self.leaf.name.clone(),
            label: self.label.clone(),
            key: self.key.to_string(),
            outcome,
            reason: reason.into(),
        }
    }
}

/// Existence check, download, upload and clean-up for one task.
#[derive(Clone)]
pub struct TransferWorker {
    ctx: Arc<Context>,
    index: DestinationIndex,
    download: RestartableDownload,
    upload: RetryingUpload,
}

impl TransferWorker {
    pub fn new(ctx: Arc<Context>) -> Self {
        let settings = &ctx.settings;
        Self {
            index: DestinationIndex::new(ctx.backend.clone()),
            download: RestartableDownload::new(
                ctx.source.clone(),
                settings.retry,
                settings.chunk_size,
                ctx.events.clone(),
            ),
            upload: RetryingUpload::new(ctx.backend.clone(), settings.retry),
            ctx,
        }
    }

    /// Run a task to its outcome. Never fails: every error becomes part of
    /// the returned report. The staging file is gone when this returns.
    pub async fn run(&self, task: &TransferTask) -> TaskReport {
        let staging = StagingFile::new(task.staging.clone());
        let report = self.transfer(task, &staging).await;
        staging.discard().await;
        match report.outcome {
            Outcome::Succeeded => tracing::info!(key = %report.key, leaf = %report.leaf, "Transferred"),
            Outcome::Skipped => tracing::debug!(key = %report.key, reason = %report.reason, "Skipped"),
            outcome => {
                tracing::warn!(
                    key = %report.key,
                    leaf = %report.leaf,
                    %outcome,
                    reason = %report.reason,
                    "Transfer failed"
                );
            },
        }
        report
    }

    async fn transfer(&self, task: &TransferTask, staging: &StagingFile) -> TaskReport {
        if let Err(owner) = self.ctx.keys.claim(&task.key, &task.leaf.id).await {
            tracing::warn!(
                key = %task.key,
                leaf = %task.leaf.id,
                %owner,
                "Destination key collision, keeping the first leaf"
            );
            return task.report(Outcome::Skipped, format!("destination key already claimed by leaf {owner}"));
        }
        match self.index.exists(&task.key).await {
            Ok(true) => return task.report(Outcome::Skipped, "already present at destination"),
            Ok(false) => {},
            Err(e) => return task.report(Outcome::CheckFailed, describe(&e)),
        }
        let bytes = match self.download.fetch(&task.leaf, staging.path()).await {
            Ok(bytes) => bytes,
            Err(e) => return task.report(Outcome::DownloadFailed, describe(&e)),
        };
        match self.upload.upload(staging.path(), &task.key).await {
            Ok(()) => task.report(Outcome::Succeeded, format!("uploaded {bytes} bytes")),
            Err(e) => task.report(Outcome::UploadFailed, describe(&e)),
        }
    }
}

fn describe(err: &crate::Error) -> String {
    let kind: &ErrorKind = err;
    kind.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RetryPolicy, Settings};
    use ferry_source::tree::MockTree;
    use ferry_source::{NodeId, SourceTree};
    use ferry_storage::backend::MockBackend;

    struct Fixture {
        _tmp: tempfile::TempDir,
        tree: Arc<MockTree>,
        backend: Arc<MockBackend>,
        worker: TransferWorker,
        task: TransferTask,
    }

    async fn fixture(tree: MockTree, backend: MockBackend) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let tree = Arc::new(tree);
        let backend = Arc::new(backend);
        let settings = Settings::new(tmp.path()).with_retry(RetryPolicy::immediate(5));
        let ctx = Arc::new(Context::new(tree.clone(), backend.clone(), settings));
        let staging = StagingArea::prepare(tmp.path()).await.unwrap();
        let leaf = tree.list_children(&NodeId::from("lbl")).await.unwrap().remove(0);
        let task = TransferTask::new(&ctx, &staging, "running", leaf);
        Fixture { _tmp: tmp, tree, backend, worker: TransferWorker::new(ctx), task }
    }

    fn tree() -> MockTree {
        MockTree::new("root")
            .with_folder("root", "lbl", "running")
            .with_file("lbl", "v1", "vid1.mp4", b"video".to_vec())
    }

    #[tokio::test]
    async fn test_task_layout() {
        let f = fixture(tree(), MockBackend::default()).await;
        assert_eq!(f.task.key.as_str(), "labels/running/vid1.mp4");
        assert!(f.task.staging.ends_with("v1_vid1.mp4"));
    }

    #[tokio::test]
    async fn test_succeeds_and_cleans_up() {
        let f = fixture(tree(), MockBackend::default()).await;
        let report = f.worker.run(&f.task).await;
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(f.backend.get("labels/running/vid1.mp4").await.as_deref(), Some(b"video".as_slice()));
        assert!(!f.task.staging.exists());
    }

    #[tokio::test]
    async fn test_existing_key_skips_download() {
        let backend = MockBackend::with_objects([("labels/running/vid1.mp4", b"old".to_vec())]);
        let f = fixture(tree(), backend).await;
        let report = f.worker.run(&f.task).await;
        assert_eq!(report.outcome, Outcome::Skipped);
        assert_eq!(f.tree.total_download_attempts().await, 0);
        assert_eq!(f.backend.upload_attempts("labels/running/vid1.mp4").await, 0);
    }

    #[tokio::test]
    async fn test_check_failure_is_fatal_to_the_task() {
        let backend = MockBackend::default().with_broken_stat("labels/running/vid1.mp4");
        let f = fixture(tree(), backend).await;
        let report = f.worker.run(&f.task).await;
        assert_eq!(report.outcome, Outcome::CheckFailed);
        assert!(report.reason.contains("labels/running/vid1.mp4"));
        assert_eq!(f.tree.total_download_attempts().await, 0);
    }

    #[tokio::test]
    async fn test_download_failure() {
        let f = fixture(tree().with_failing_downloads("v1", usize::MAX), MockBackend::default()).await;
        let report = f.worker.run(&f.task).await;
        assert_eq!(report.outcome, Outcome::DownloadFailed);
        assert_eq!(f.backend.upload_attempts("labels/running/vid1.mp4").await, 0);
        assert!(!f.task.staging.exists());
    }

    #[tokio::test]
    async fn test_upload_failure_cleans_up() {
        let backend = MockBackend::default().with_failing_uploads("labels/running/vid1.mp4", usize::MAX);
        let f = fixture(tree(), backend).await;
        let report = f.worker.run(&f.task).await;
        assert_eq!(report.outcome, Outcome::UploadFailed);
        assert!(report.reason.contains("after 5 attempt(s)"));
        assert!(!f.task.staging.exists());
    }

    #[tokio::test]
    async fn test_second_leaf_with_same_key_is_skipped() {
        let f = fixture(tree(), MockBackend::default()).await;
        let mut other = f.task.clone();
        other.leaf.id = NodeId::from("v2");
        f.worker.ctx.keys.claim(&other.key, &other.leaf.id).await.unwrap();

        let report = f.worker.run(&f.task).await;
        assert_eq!(report.outcome, Outcome::Skipped);
        assert_eq!(report.reason, "destination key already claimed by leaf v2");
        assert_eq!(f.tree.total_download_attempts().await, 0);
    }
}
