//! Per-task outcomes and the run summary.

use derive_more::Display;
use ferry_source::NodeId;
use std::fmt;

/// Terminal result of one transfer task. Reported exactly once per task.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Nothing to do: the key already exists, or another leaf owns it.
    #[display("skipped")]
    Skipped,
    #[display("succeeded")]
    Succeeded,
    #[display("download failed")]
    DownloadFailed,
    #[display("upload failed")]
    UploadFailed,
    /// The destination could not tell whether the key exists.
    #[display("check failed")]
    CheckFailed,
    /// The worker panicked.
    #[display("crashed")]
    Crashed,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Skipped | Self::Succeeded)
    }
}

/// What happened to one leaf, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub leaf: NodeId,
    pub name: String,
    pub label: String,
    pub key: String,
    pub outcome: Outcome,
    /// Human-readable explanation, for logs and summaries.
    pub reason: String,
}

/// Aggregate counts of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub skipped: usize,
    pub succeeded: usize,
    pub download_failed: usize,
    pub upload_failed: usize,
    pub check_failed: usize,
    pub crashed: usize,
    /// Resolution or label folders that could not be listed.
    pub enumeration_failures: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Skipped => &mut self.skipped,
            Outcome::Succeeded => &mut self.succeeded,
            Outcome::DownloadFailed => &mut self.download_failed,
            Outcome::UploadFailed => &mut self.upload_failed,
            Outcome::CheckFailed => &mut self.check_failed,
            Outcome::Crashed => &mut self.crashed,
        };
        *counter += 1;
    }

    /// Number of tasks that ended in a failure.
    pub fn failed(&self) -> usize {
        self.download_failed + self.upload_failed + self.check_failed + self.crashed
    }

    /// Number of tasks that reached a terminal outcome.
    pub fn tasks(&self) -> usize {
        self.skipped + self.succeeded + self.failed()
    }

    /// Whether anything went wrong, including unlistable folders.
    pub fn has_failures(&self) -> bool {
        self.failed() > 0 || self.enumeration_failures > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} skipped, ", self.succeeded, self.skipped)?;
        write!(
            f,
            "{} download failed, {} upload failed, {} check failed, {} crashed, {} unlistable folder(s)",
            self.download_failed,
            self.upload_failed,
            self.check_failed,
            self.crashed,
            self.enumeration_failures,
        )
    }
}
