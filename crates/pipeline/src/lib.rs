//! Resilient bulk transfer of a `resolution/label/item` media tree into a
//! flat-keyed object store.
//!
//! The entry point is [`transfer`]. For each label folder it builds one
//! [`TransferTask`] per allowed leaf and hands them to a bounded
//! [`TransferScheduler`]; each task goes through existence check,
//! [restartable download](RestartableDownload), [retrying upload](RetryingUpload)
//! and staging clean-up, and ends in exactly one [`Outcome`].
//!
//! Running the same transfer twice is safe: keys that already exist in the
//! destination are skipped without downloading anything.

mod download;
mod enumerate;
pub mod error;
mod event;
mod index;
mod key;
mod outcome;
mod restructure;
mod retry;
mod run;
mod scheduler;
mod settings;
mod staging;
mod upload;
mod worker;

pub use crate::download::RestartableDownload;
pub use crate::enumerate::{Extensions, LeafScan, SourceEnumerator};
pub use crate::error::{Error, Result};
pub use crate::event::{EventSink, TransferEvent};
pub use crate::index::DestinationIndex;
pub use crate::key::{DestinationKey, KeyRegistry};
pub use crate::outcome::{Outcome, RunSummary, TaskReport};
pub use crate::restructure::{RestructureSummary, restructure};
pub use crate::retry::{RetryPolicy, RetryState};
pub use crate::run::transfer;
pub use crate::scheduler::TransferScheduler;
pub use crate::settings::Settings;
pub use crate::staging::{StagingArea, StagingFile};
pub use crate::upload::RetryingUpload;
pub use crate::worker::{TransferTask, TransferWorker};
use ferry_source::SourceHandle;
use ferry_storage::BackendHandle;

/// Everything a run shares between its components.
pub struct Context {
    pub source: SourceHandle,
    pub backend: BackendHandle,
    pub settings: Settings,
    pub events: EventSink,
    pub(crate) keys: KeyRegistry,
}

impl Context {
    pub fn new(source: SourceHandle, backend: BackendHandle, settings: Settings) -> Self {
        Self {
            source,
            backend,
            settings,
            events: EventSink::disabled(),
            keys: KeyRegistry::default(),
        }
    }

    /// Send progress and outcome events to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }
}
