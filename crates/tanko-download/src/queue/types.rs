//! Queue item types.

use std::path::PathBuf;

use serde::Serialize;
use tanko_cache::chapter_key;
use tanko_core::{Chapter, ChapterId, DownloadStatus, Manga, MangaId, Page, SourceId};

/// One chapter download: the unit of queueing and of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub chapter: Chapter,
    pub manga: Manga,
    pub source_id: SourceId,
    /// Display name of the source; the first path segment under the
    /// downloads root.
    pub source_name: String,
    /// Final chapter directory.
    pub directory: PathBuf,
    /// `None` until the page list has been loaded.
    pub pages: Option<Vec<Page>>,
    pub status: DownloadStatus,
    /// Pages whose image is on disk.
    pub downloaded_images: u32,
    /// Reason for the last `Error` status.
    pub error: Option<String>,
}

impl Download {
    /// A freshly queued download.
    pub fn new(
        chapter: Chapter,
        manga: Manga,
        source_id: SourceId,
        source_name: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            chapter,
            manga,
            source_id,
            source_name: source_name.into(),
            directory: directory.into(),
            pages: None,
            status: DownloadStatus::Queued,
            downloaded_images: 0,
            error: None,
        }
    }

    pub const fn id(&self) -> ChapterId {
        self.chapter.id
    }

    pub const fn manga_id(&self) -> MangaId {
        self.manga.id
    }

    /// Key of this chapter's page list in the metadata cache.
    pub fn cache_key(&self) -> String {
        chapter_key(self.source_id, &self.chapter.url)
    }

    /// Number of pages, 0 while the page list is unknown.
    pub fn page_count(&self) -> u32 {
        self.pages
            .as_ref()
            .map_or(0, |pages| u32::try_from(pages.len()).unwrap_or(u32::MAX))
    }

    /// Mean page progress, 0-100.
    pub fn total_progress(&self) -> u8 {
        let Some(pages) = self.pages.as_ref().filter(|p| !p.is_empty()) else {
            return 0;
        };
        let sum: u64 = pages.iter().map(|p| u64::from(p.progress)).sum();
        let count = u64::try_from(pages.len()).unwrap_or(u64::MAX);
        u8::try_from(sum / count).unwrap_or(100)
    }

    pub(crate) fn recount_ready(&mut self) {
        self.downloaded_images = self.pages.as_ref().map_or(0, |pages| {
            u32::try_from(pages.iter().filter(|p| p.is_ready()).count()).unwrap_or(u32::MAX)
        });
    }
}
