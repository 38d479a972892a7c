#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

// Re-export core types for convenience
pub use tanko_core::{ChapterNotice, DownloadError, DownloadEvent, DownloadResult, DownloadStatus};

pub mod engine;
pub(crate) mod progress;
pub mod queue;
pub mod scheduler;

pub use engine::{
    ChapterDestination, ChapterOutcome, DownloadEngine, EngineConfig, EngineDeps, EnqueueReport,
};
pub use progress::ProgressThrottle;
pub use queue::{Download, DownloadQueue, EVENT_CAPACITY, SharedQueue};
pub use scheduler::{DynamicScheduler, SchedulerError, SchedulerHandle, SchedulerStats};

// Silence unused dev-dependency warnings for unit tests that don't touch them
#[cfg(test)]
use async_trait as _;
#[cfg(test)]
use bytes as _;
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;
