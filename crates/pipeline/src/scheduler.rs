//! Bounded worker pool over the leaves of one label.

use crate::error::ErrorKind;
use crate::event::{EventSink, TransferEvent};
use crate::worker::{TransferTask, TransferWorker};
use crate::{Outcome, TaskReport};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::instrument;

/// Runs the tasks of one label with at most `max_workers` of them active.
///
/// A fixed set of executors pulls tasks from a shared queue and reports
/// through a result channel. A panicking task is caught at the executor and
/// reported as [`Outcome::Crashed`]; it never takes its executor, its
/// siblings or the run down with it.
#[derive(Clone)]
pub struct TransferScheduler {
    worker: Arc<TransferWorker>,
    events: EventSink,
    max_workers: usize,
}

impl TransferScheduler {
    pub fn new(worker: TransferWorker, events: EventSink, max_workers: usize) -> Self {
        Self { worker: Arc::new(worker), events, max_workers: max_workers.max(1) }
    }

    /// Run every task of a label and return one report per task, in
    /// completion order. Returns only once all tasks are finished.
    #[instrument(skip_all, fields(label = %label, tasks = tasks.len()))]
    pub async fn run_label(&self, label: &str, tasks: Vec<TransferTask>) -> Vec<TaskReport> {
        if tasks.is_empty() {
            return Vec::new();
        }
        let total = tasks.len();
        let (queue_tx, queue_rx) = mpsc::channel(total);
        for task in tasks {
            // Capacity matches the number of tasks and the receiver is alive.
            if let Err(e) = queue_tx.try_send(task) {
                tracing::error!(error = %e, "Could not queue task");
            }
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let (result_tx, mut result_rx) = mpsc::channel(self.max_workers);
        let executors: Vec<_> = (0..self.max_workers.min(total))
            .map(|_| tokio::spawn(Self::executor(self.worker.clone(), queue.clone(), result_tx.clone())))
            .collect();
        drop(result_tx);

        let mut reports = Vec::with_capacity(total);
        while let Some(report) = result_rx.recv().await {
            self.events.emit(TransferEvent::Finished(report.clone()));
            reports.push(report);
        }
        for executor in executors {
            if let Err(e) = executor.await {
                tracing::error!(error = %e, "Executor stopped unexpectedly");
            }
        }
        if reports.len() != total {
            tracing::error!(expected = total, reported = reports.len(), "Some tasks produced no report");
        }
        reports
    }

    async fn executor(
        worker: Arc<TransferWorker>,
        queue: Arc<Mutex<mpsc::Receiver<TransferTask>>>,
        results: mpsc::Sender<TaskReport>,
    ) {
        loop {
            // The lock is released before the task runs.
            let Some(task) = queue.lock().await.recv().await else {
                break;
            };
            let report = match AssertUnwindSafe(worker.run(&task)).catch_unwind().await {
                Ok(report) => report,
                Err(panic) => {
                    let kind = ErrorKind::WorkerPanic(panic_message(panic.as_ref()));
                    tracing::error!(key = %task.key, leaf = %task.leaf.id, error = %kind, "Worker crashed");
                    task.report(Outcome::Crashed, kind.to_string())
                },
            };
            if results.send(report).await.is_err() {
                break;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
