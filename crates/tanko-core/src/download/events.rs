//! Download events - discriminated union for all queue state changes.

use serde::{Deserialize, Serialize};

use super::status::DownloadStatus;
use crate::domain::{ChapterId, PageStatus};

/// Single discriminated union for everything a queue listener can observe.
///
/// Serialized with an internal `type` tag:
///
/// ```text
/// { "type": "queued", "chapter_id": 12 }
/// { "type": "status_changed", "chapter_id": 12, "status": "downloading" }
/// { "type": "page_changed", "chapter_id": 12, "index": 3, "status": "ready", "progress": 100 }
/// { "type": "progress", "chapter_id": 12, "downloaded": 4, "total": 10, "percent": 40 }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// A chapter entered the queue.
    Queued { chapter_id: ChapterId },

    /// A chapter moved along its lifecycle.
    StatusChanged {
        chapter_id: ChapterId,
        status: DownloadStatus,
        /// Reason for an `Error` status.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A page changed status or byte progress.
    PageChanged {
        chapter_id: ChapterId,
        index: u32,
        status: PageStatus,
        progress: u8,
    },

    /// Chapter-level progress after a page finished.
    Progress {
        chapter_id: ChapterId,
        /// Pages whose image is on disk.
        downloaded: u32,
        total: u32,
        /// Rounded down, 0-100.
        percent: u8,
    },

    /// A chapter left the queue (completed or removed by the user).
    Removed { chapter_id: ChapterId },

    /// No queued or in-flight chapter remains.
    QueueDrained,

    /// The engine stopped; `error` is set when it stopped on an internal failure.
    EngineStopped {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl DownloadEvent {
    /// Create a status change event without an error.
    #[must_use]
    pub const fn status(chapter_id: ChapterId, status: DownloadStatus) -> Self {
        Self::StatusChanged {
            chapter_id,
            status,
            error: None,
        }
    }

    /// Create an `Error` status change event.
    pub fn failed(chapter_id: ChapterId, error: impl Into<String>) -> Self {
        Self::StatusChanged {
            chapter_id,
            status: DownloadStatus::Error,
            error: Some(error.into()),
        }
    }

    /// Create a chapter progress event.
    #[must_use]
    pub fn progress(chapter_id: ChapterId, downloaded: u32, total: u32) -> Self {
        let percent = if total == 0 {
            0
        } else {
            u8::try_from(u64::from(downloaded.min(total)) * 100 / u64::from(total)).unwrap_or(100)
        };
        Self::Progress {
            chapter_id,
            downloaded,
            total,
            percent,
        }
    }

    /// Chapter this event refers to, if any.
    #[must_use]
    pub const fn chapter_id(&self) -> Option<ChapterId> {
        match self {
            Self::Queued { chapter_id }
            | Self::StatusChanged { chapter_id, .. }
            | Self::PageChanged { chapter_id, .. }
            | Self::Progress { chapter_id, .. }
            | Self::Removed { chapter_id } => Some(*chapter_id),
            Self::QueueDrained | Self::EngineStopped { .. } => None,
        }
    }

    /// Get the event name for logging and transport routing.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "download:queued",
            Self::StatusChanged { .. } => "download:status",
            Self::PageChanged { .. } => "download:page",
            Self::Progress { .. } => "download:progress",
            Self::Removed { .. } => "download:removed",
            Self::QueueDrained => "download:drained",
            Self::EngineStopped { .. } => "download:stopped",
        }
    }
}

/// Coarse notice for a host UI notifier (one per chapter milestone).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChapterNotice {
    Queued,
    Downloading,
    Done,
    Error { message: String },
}
