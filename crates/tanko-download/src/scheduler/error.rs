//! Scheduler infrastructure errors.

use tanko_core::DownloadError;
use thiserror::Error;

/// Failure of the pool itself. Per-job failures are job outputs, never this.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A worker task panicked while running a job.
    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),

    /// The desired-count signal closed at zero while jobs were waiting, so
    /// nothing could ever run them.
    #[error("worker count signal closed at 0 with {pending} job(s) pending")]
    SignalClosed { pending: usize },

    /// The supervisor task itself failed.
    #[error("scheduler supervisor failed: {0}")]
    Supervisor(String),
}

impl From<SchedulerError> for DownloadError {
    fn from(err: SchedulerError) -> Self {
        Self::scheduler(err.to_string())
    }
}
