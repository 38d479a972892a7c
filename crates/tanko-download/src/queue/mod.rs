//! Download queue management.
//!
//! [`DownloadQueue`] is a pure state machine over the ordered set of chapter
//! downloads. No I/O is performed here; commands return the
//! [`DownloadEvent`]s they caused and [`SharedQueue`] publishes them.
//!
//! # Design
//!
//! - Pure synchronous state machine (no async, no IO, no tracing)
//! - Insertion order is queue order; removal preserves the order of the rest
//! - At most one entry per chapter id
//! - Every status change is checked against the chapter lifecycle

mod shared;
mod types;

use indexmap::IndexMap;
use tanko_core::{ChapterId, DownloadError, DownloadEvent, DownloadResult, DownloadStatus, Page};

pub use shared::{EVENT_CAPACITY, SharedQueue};
pub use types::Download;

/// Ordered chapter downloads keyed by chapter id.
///
/// This is a sync type with no internal locking; the caller
/// ([`SharedQueue`]) is responsible for synchronization.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    entries: IndexMap<ChapterId, Download>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ChapterId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: ChapterId) -> Option<&Download> {
        self.entries.get(&id)
    }

    /// Entries in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Download> {
        self.entries.values()
    }

    /// Append a download. Idempotent: an id already present is left alone
    /// and no event is produced.
    pub fn add(&mut self, download: Download) -> Option<DownloadEvent> {
        let id = download.id();
        if self.entries.contains_key(&id) {
            return None;
        }
        self.entries.insert(id, download);
        Some(DownloadEvent::Queued { chapter_id: id })
    }

    /// Remove an entry, keeping the order of the others.
    ///
    /// An entry a worker is processing cannot be removed.
    pub fn remove(&mut self, id: ChapterId) -> DownloadResult<(Download, DownloadEvent)> {
        let status = self.get_mut(id)?.status;
        if status == DownloadStatus::Downloading {
            return Err(DownloadError::invalid_transition(
                format!("chapter {id}"),
                status.as_str(),
                "removed",
            ));
        }
        let download = self
            .entries
            .shift_remove(&id)
            .ok_or_else(|| DownloadError::not_in_queue(id.to_string()))?;
        Ok((download, DownloadEvent::Removed { chapter_id: id }))
    }

    /// Ids of entries in `status`, in queue order.
    pub fn ids_with_status(&self, status: DownloadStatus) -> Vec<ChapterId> {
        self.entries
            .values()
            .filter(|d| d.status == status)
            .map(Download::id)
            .collect()
    }

    /// Whether anything is queued or in flight.
    pub fn has_pending_work(&self) -> bool {
        self.entries
            .values()
            .any(|d| matches!(d.status, DownloadStatus::Queued | DownloadStatus::Downloading))
    }

    /// Move an entry along the lifecycle.
    ///
    /// `error` is recorded for `Error` and cleared for every other status.
    pub fn set_status(
        &mut self,
        id: ChapterId,
        status: DownloadStatus,
        error: Option<String>,
    ) -> DownloadResult<DownloadEvent> {
        let download = self.get_mut(id)?;
        if !download.status.can_transition_to(status) {
            return Err(DownloadError::invalid_transition(
                format!("chapter {id}"),
                download.status.as_str(),
                status.as_str(),
            ));
        }
        download.status = status;
        download.error = if status == DownloadStatus::Error {
            error
        } else {
            None
        };
        Ok(DownloadEvent::StatusChanged {
            chapter_id: id,
            status,
            error: download.error.clone(),
        })
    }

    /// Claim a `Queued` entry for a worker: `Queued → Downloading`.
    ///
    /// Returns `None` when the entry is gone or no longer queued.
    pub fn begin(&mut self, id: ChapterId) -> Option<(Download, DownloadEvent)> {
        let download = self.entries.get(&id)?;
        if download.status != DownloadStatus::Queued {
            return None;
        }
        let event = self.set_status(id, DownloadStatus::Downloading, None).ok()?;
        self.entries.get(&id).cloned().map(|d| (d, event))
    }

    /// Install a freshly loaded page list.
    pub fn set_pages(&mut self, id: ChapterId, pages: Vec<Page>) -> DownloadResult<DownloadEvent> {
        let download = self.get_mut(id)?;
        download.pages = Some(pages);
        download.recount_ready();
        Ok(DownloadEvent::progress(
            id,
            download.downloaded_images,
            download.page_count(),
        ))
    }

    /// Replace one page's state.
    ///
    /// Emits `PageChanged`, plus `Progress` when the page became ready.
    pub fn update_page(&mut self, id: ChapterId, page: &Page) -> DownloadResult<Vec<DownloadEvent>> {
        let download = self.get_mut(id)?;
        let slot = download
            .pages
            .as_mut()
            .and_then(|pages| pages.iter_mut().find(|p| p.index == page.index))
            .ok_or_else(|| DownloadError::other(format!("chapter {id} has no page {}", page.index)))?;

        let became_ready = page.is_ready() && !slot.is_ready();
        slot.clone_from(page);

        let mut events = vec![DownloadEvent::PageChanged {
            chapter_id: id,
            index: page.index,
            status: page.status,
            progress: page.progress,
        }];
        if became_ready {
            download.recount_ready();
            events.push(DownloadEvent::progress(
                id,
                download.downloaded_images,
                download.page_count(),
            ));
        }
        Ok(events)
    }

    /// Manual retry: `Error | Downloaded → Queued`, failed pages back to
    /// `Queued`.
    pub fn retry(&mut self, id: ChapterId) -> DownloadResult<DownloadEvent> {
        let event = self.set_status(id, DownloadStatus::Queued, None)?;
        let download = self.get_mut(id)?;
        if let Some(pages) = download.pages.as_mut() {
            for page in pages.iter_mut() {
                page.reset_for_retry();
            }
        }
        download.recount_ready();
        Ok(event)
    }

    /// Remove every entry that is not in flight.
    pub fn clear(&mut self) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        self.entries.retain(|id, download| {
            let keep = download.status == DownloadStatus::Downloading;
            if !keep {
                events.push(DownloadEvent::Removed { chapter_id: *id });
            }
            keep
        });
        events
    }

    fn get_mut(&mut self, id: ChapterId) -> DownloadResult<&mut Download> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| DownloadError::not_in_queue(id.to_string()))
    }
}
