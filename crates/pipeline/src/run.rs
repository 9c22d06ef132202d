use crate::enumerate::SourceEnumerator;
use crate::error::Result;
use crate::scheduler::TransferScheduler;
use crate::staging::StagingArea;
use crate::worker::{TransferTask, TransferWorker};
use crate::{Context, RunSummary};
use std::sync::Arc;

/// Transfer every allowed leaf of the source into the destination.
///
/// Resolutions and labels are walked one after the other; the leaves of a
/// label are all finished before the next label starts. Only failing to list
/// the source root aborts the run. An unlistable resolution or label is
/// logged, counted in [`RunSummary::enumeration_failures`] and skipped.
///
/// # Examples
///
/// ```
/// use ferry_pipeline::{Context, RetryPolicy, Settings, transfer};
/// use ferry_source::tree::MockTree;
/// use ferry_storage::backend::MockBackend;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferry_pipeline::Result<()> {
/// let staging = std::env::temp_dir().join("ferry-doc-example");
/// let tree = MockTree::new("root")
///     .with_folder("root", "r200", "200")
///     .with_folder("r200", "l1", "running")
///     .with_file("l1", "v1", "vid1.mp4", b"video".to_vec());
/// let backend = Arc::new(MockBackend::default());
/// let settings = Settings::new(&staging).with_retry(RetryPolicy::immediate(5));
///
/// let summary = transfer(Arc::new(Context::new(Arc::new(tree), backend.clone(), settings))).await?;
/// assert_eq!(summary.succeeded, 1);
/// assert!(backend.get("labels/running/vid1.mp4").await.is_some());
/// # Ok(())
/// # }
/// ```
pub async fn transfer(ctx: Arc<Context>) -> Result<RunSummary> {
    ctx.settings.validate()?;
    let staging = StagingArea::prepare(&ctx.settings.staging_dir).await?;
    let enumerator = SourceEnumerator::new(ctx.source.clone(), ctx.settings.extensions.clone());
    let scheduler =
        TransferScheduler::new(TransferWorker::new(ctx.clone()), ctx.events.clone(), ctx.settings.max_workers);
    let mut summary = RunSummary::default();

    let resolutions = enumerator.resolutions().await?;
    tracing::info!(
        source = ctx.source.name(),
        destination = ctx.backend.name(),
        resolutions = resolutions.len(),
        "Starting transfer"
    );
    for resolution in resolutions {
        let labels = match enumerator.labels(&resolution).await {
            Ok(labels) => labels,
            Err(e) => {
                tracing::error!(resolution = %resolution.name, error = %*e, "Could not list resolution, skipping it");
                summary.enumeration_failures += 1;
                continue;
            },
        };
        tracing::info!(resolution = %resolution.name, labels = labels.len(), "Processing resolution");
        for label in labels {
            let leaves = match enumerator.leaves(&label).await {
                Ok(leaves) => leaves,
                Err(e) => {
                    tracing::error!(
                        resolution = %resolution.name,
                        label = %label.name,
                        error = %*e,
                        "Could not list label, skipping it"
                    );
                    summary.enumeration_failures += 1;
                    continue;
                },
            };
            let tasks: Vec<_> =
                leaves.into_iter().map(|leaf| TransferTask::new(&ctx, &staging, &label.name, leaf)).collect();
            for report in scheduler.run_label(&label.name, tasks).await {
                summary.record(report.outcome);
            }
        }
    }

    tracing::info!(%summary, "Transfer finished");
    Ok(summary)
}
