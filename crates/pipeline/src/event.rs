//! Progress observation.
//!
//! Events are fire-and-forget: the sink never blocks a transfer, and when
//! nobody keeps up with the channel, events are dropped.

use crate::TaskReport;
use ferry_source::NodeId;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Bytes of a leaf written to staging so far, during one download
    /// attempt. Restarts from zero on the next attempt.
    Progress { leaf: NodeId, bytes: u64, total: Option<u64> },
    /// Terminal event, exactly one per leaf.
    Finished(TaskReport),
}

/// Optional, never-blocking event sender.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<TransferEvent>>,
}

impl EventSink {
    /// A sink and the receiving end of its bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransferEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender: Some(sender) }, receiver)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: TransferEvent) {
        if let Some(sender) = &self.sender
            && let Err(e) = sender.try_send(event)
        {
            tracing::trace!(error = %e, "Dropped transfer event");
        }
    }
}
