//! End-to-end runs of [`transfer`] over in-memory sources and stores.

use ferry_pipeline::error::ErrorKind;
use ferry_pipeline::{Context, EventSink, Outcome, RetryPolicy, RunSummary, Settings, TransferEvent, transfer};
use ferry_source::tree::MockTree;
use ferry_storage::backend::MockBackend;
use std::sync::Arc;
use std::time::Duration;

struct Run {
    _staging: tempfile::TempDir,
    staging_dir: std::path::PathBuf,
    tree: Arc<MockTree>,
    backend: Arc<MockBackend>,
}

impl Run {
    fn new(tree: MockTree, backend: MockBackend) -> Self {
        let staging = tempfile::tempdir().unwrap();
        let staging_dir = staging.path().join("temp_download");
        Self { _staging: staging, staging_dir, tree: Arc::new(tree), backend: Arc::new(backend) }
    }

    fn settings(&self) -> Settings {
        Settings::new(&self.staging_dir).with_retry(RetryPolicy::immediate(5)).with_chunk_size(4)
    }

    fn context(&self) -> Context {
        Context::new(self.tree.clone(), self.backend.clone(), self.settings())
    }

    async fn transfer(&self) -> RunSummary {
        transfer(Arc::new(self.context())).await.unwrap()
    }

    fn staging_is_empty(&self) -> bool {
        std::fs::read_dir(&self.staging_dir).unwrap().next().is_none()
    }
}

/// 200/running: a.mp4, b.mp4, c.mp4 and notes.txt; 200/swimming: d.MOV
fn dataset() -> MockTree {
    MockTree::new("root")
        .with_folder("root", "r200", "200")
        .with_folder("r200", "l-run", "running")
        .with_folder("r200", "l-swim", "swimming")
        .with_file("l-run", "a", "a.mp4", b"aaaaaaaaaa".to_vec())
        .with_file("l-run", "b", "b.mp4", b"bbbbbbbbbb".to_vec())
        .with_file("l-run", "c", "c.mp4", b"cccccccccc".to_vec())
        .with_file("l-run", "n", "notes.txt", b"not a video".to_vec())
        .with_file("l-swim", "d", "d.MOV", b"dddd".to_vec())
}

#[tokio::test]
async fn transfers_every_allowed_leaf() {
    let run = Run::new(dataset(), MockBackend::default());
    let summary = run.transfer().await;

    assert_eq!(summary.succeeded, 4);
    assert!(!summary.has_failures());
    assert_eq!(run.backend.len().await, 4);
    assert_eq!(run.backend.get("labels/swimming/d.MOV").await.as_deref(), Some(b"dddd".as_slice()));
    assert!(run.backend.get("labels/running/notes.txt").await.is_none());
    assert!(run.staging_is_empty());
}

#[tokio::test]
async fn scenario_a_existing_key_is_skipped_without_download() {
    let backend = MockBackend::with_objects([("labels/running/a.mp4", b"already there".to_vec())]);
    let run = Run::new(dataset(), backend);
    let summary = run.transfer().await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(run.tree.download_attempts("a").await, 0);
    assert_eq!(run.backend.upload_attempts("labels/running/a.mp4").await, 0);
    assert_eq!(run.backend.get("labels/running/a.mp4").await.as_deref(), Some(b"already there".as_slice()));
}

#[tokio::test]
async fn scenario_b_download_fails_twice_then_succeeds() {
    let run = Run::new(dataset().with_failing_downloads("b", 2), MockBackend::default());
    let summary = run.transfer().await;

    assert_eq!(summary.succeeded, 4);
    assert_eq!(run.tree.download_attempts("b").await, 3);
    assert_eq!(run.backend.get("labels/running/b.mp4").await.as_deref(), Some(b"bbbbbbbbbb".as_slice()));
    assert!(run.staging_is_empty());
}

#[tokio::test]
async fn scenario_c_upload_exhausts_retries_without_affecting_siblings() {
    let backend = MockBackend::default().with_failing_uploads("labels/running/b.mp4", usize::MAX);
    let run = Run::new(dataset(), backend);
    let (events, mut receiver) = EventSink::channel(1024);
    let summary = transfer(Arc::new(run.context().with_events(events))).await.unwrap();

    assert_eq!(summary.upload_failed, 1);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(run.backend.upload_attempts("labels/running/b.mp4").await, 5);
    assert!(run.staging_is_empty());

    let mut finished = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let TransferEvent::Finished(report) = event {
            finished.push(report);
        }
    }
    assert_eq!(finished.len(), 4);
    let failed: Vec<_> = finished.iter().filter(|r| r.outcome == Outcome::UploadFailed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].key, "labels/running/b.mp4");
    assert!(failed[0].reason.contains("after 5 attempt(s)"));
}

#[tokio::test]
async fn scenario_d_unlistable_label_is_skipped() {
    let run = Run::new(dataset().with_broken_listing("l-run"), MockBackend::default());
    let summary = run.transfer().await;

    assert_eq!(summary.enumeration_failures, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(run.backend.get("labels/swimming/d.MOV").await.is_some());
    assert!(summary.has_failures());
}

#[tokio::test]
async fn unlistable_resolution_is_skipped() {
    let tree = dataset()
        .with_folder("root", "r400", "400")
        .with_folder("r400", "l-run-400", "running")
        .with_file("l-run-400", "e", "e.mp4", b"e".to_vec())
        .with_broken_listing("r200");
    let run = Run::new(tree, MockBackend::default());
    let summary = run.transfer().await;

    assert_eq!(summary.enumeration_failures, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(run.backend.get("labels/running/e.mp4").await.is_some());
}

#[tokio::test]
async fn unlistable_root_is_fatal() {
    let run = Run::new(dataset().with_broken_listing("root"), MockBackend::default());
    let err = transfer(Arc::new(run.context())).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::Enumeration(id) if id == "root"));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let run = Run::new(dataset(), MockBackend::default());
    let first = run.transfer().await;
    let attempts = run.tree.total_download_attempts().await;

    let second = run.transfer().await;

    assert_eq!(first.succeeded, 4);
    assert_eq!(second.skipped, 4);
    assert_eq!(second.succeeded, 0);
    assert_eq!(run.tree.total_download_attempts().await, attempts);
    assert_eq!(run.backend.len().await, 4);
}

#[tokio::test]
async fn same_label_and_name_in_two_resolutions_keeps_the_first() {
    let tree = dataset()
        .with_folder("root", "r400", "400")
        .with_folder("r400", "l-run-400", "running")
        .with_file("l-run-400", "a-400", "a.mp4", b"from 400".to_vec());
    let run = Run::new(tree, MockBackend::default());
    let summary = run.transfer().await;

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.skipped, 1);
    assert_eq!(run.backend.get("labels/running/a.mp4").await.as_deref(), Some(b"aaaaaaaaaa".as_slice()));
    assert_eq!(run.tree.download_attempts("a-400").await, 0);
}

#[tokio::test]
async fn panicking_worker_is_recorded_as_crashed() {
    let run = Run::new(dataset().with_panicking_download("c"), MockBackend::default());
    let summary = run.transfer().await;

    assert_eq!(summary.crashed, 1);
    assert_eq!(summary.succeeded, 3);
    assert!(run.staging_is_empty());
}

#[tokio::test]
async fn download_failure_never_reaches_the_store() {
    let run = Run::new(dataset().with_failing_downloads("a", usize::MAX), MockBackend::default());
    let summary = run.transfer().await;

    assert_eq!(summary.download_failed, 1);
    assert_eq!(run.tree.download_attempts("a").await, 5);
    assert_eq!(run.backend.upload_attempts("labels/running/a.mp4").await, 0);
    assert!(run.staging_is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_are_bounded_and_labels_run_one_after_the_other() {
    let mut tree = MockTree::new("root")
        .with_folder("root", "r200", "200")
        .with_folder("r200", "l-arch", "archery")
        .with_folder("r200", "l-bowl", "bowling");
    for n in 0..6 {
        tree = tree
            .with_file("l-arch", format!("a{n}"), format!("a{n}.mp4"), b"arrow".to_vec())
            .with_file("l-bowl", format!("b{n}"), format!("b{n}.mp4"), b"strike".to_vec());
    }
    let run = Run::new(tree.with_download_delay(Duration::from_millis(50)), MockBackend::default());
    let ctx = Context::new(run.tree.clone(), run.backend.clone(), run.settings().with_max_workers(3));
    let summary = transfer(Arc::new(ctx)).await.unwrap();

    assert_eq!(summary.succeeded, 12);
    let peak = run.tree.peak_concurrent_downloads().await;
    assert!((2..=3).contains(&peak), "peak of {peak} concurrent downloads");

    let mut last_archery_end = 0;
    let mut first_bowling_start = usize::MAX;
    for n in 0..6 {
        let (_, end) = run.tree.download_window(format!("a{n}")).await.unwrap();
        let (start, _) = run.tree.download_window(format!("b{n}")).await.unwrap();
        last_archery_end = last_archery_end.max(end);
        first_bowling_start = first_bowling_start.min(start);
    }
    assert!(last_archery_end < first_bowling_start);
}
