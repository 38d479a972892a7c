//! Per-chapter download pipeline.
//!
//! A worker owns one chapter from `Downloading` to its final status. It
//! works on its own copies of the pages and publishes every page change
//! through the shared queue; nothing else mutates an in-flight download.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, stream};
use tanko_core::{
    ChapterId, ChapterNotice, DownloadError, DownloadResult, DownloadStatus, Page, PageStatus,
    SourcePort, aggregate_status,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::paths::ChapterDestination;
use super::{ChapterOutcome, EngineInner, source_error};
use crate::progress::{ProgressThrottle, percent_of};
use crate::queue::Download;

/// What a finished pipeline produced.
#[derive(Debug)]
struct ChapterSummary {
    status: DownloadStatus,
    total: usize,
    failed: usize,
    files: usize,
}

impl ChapterSummary {
    fn error_message(&self) -> String {
        if self.failed > 0 {
            format!("{} of {} pages failed", self.failed, self.total)
        } else {
            format!(
                "expected {} files in chapter directory, found {}",
                self.total + 1,
                self.files
            )
        }
    }
}

impl EngineInner {
    /// Claim `id` and run it to a final status.
    ///
    /// Chapters that are gone or no longer `Queued` are skipped untouched.
    pub(super) async fn run_chapter(&self, id: ChapterId, cancel: &CancellationToken) -> ChapterOutcome {
        let Some(download) = self.queue.begin(id) else {
            debug!(target: "tanko.download", chapter_id = %id, "Chapter no longer queued, skipping");
            return ChapterOutcome::Skipped { chapter_id: id };
        };
        self.notifier.notify(id, ChapterNotice::Downloading);
        info!(
            target: "tanko.download",
            chapter_id = %id,
            chapter = %download.chapter.name,
            manga = %download.manga.title,
            "Chapter download started"
        );

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = self.download_chapter(&download) => result,
        };
        self.finish(&download, result)
    }

    fn finish(&self, download: &Download, result: DownloadResult<ChapterSummary>) -> ChapterOutcome {
        let id = download.id();
        let error = match result {
            Ok(summary) if summary.status == DownloadStatus::Downloaded => {
                let completed = self
                    .queue
                    .set_status(id, DownloadStatus::Downloaded, None)
                    .and_then(|()| self.queue.remove(id).map(drop));
                if let Err(e) = completed {
                    warn!(target: "tanko.download", chapter_id = %id, error = %e, "Could not retire finished chapter");
                }
                self.notifier.notify(id, ChapterNotice::Done);
                info!(
                    target: "tanko.download",
                    chapter_id = %id,
                    pages = summary.total,
                    "Chapter downloaded"
                );
                return ChapterOutcome::Downloaded { chapter_id: id };
            }
            Ok(summary) => DownloadError::other(summary.error_message()),
            Err(e) => e,
        };

        let message = error.to_string();
        if let Err(e) = self
            .queue
            .set_status(id, DownloadStatus::Error, Some(message.clone()))
        {
            warn!(target: "tanko.download", chapter_id = %id, error = %e, "Could not mark chapter failed");
        }
        self.notifier.notify(id, ChapterNotice::Error { message: message.clone() });
        warn!(target: "tanko.download", chapter_id = %id, error = %message, "Chapter download failed");
        ChapterOutcome::Failed {
            chapter_id: id,
            error,
        }
    }

    async fn download_chapter(&self, download: &Download) -> DownloadResult<ChapterSummary> {
        let id = download.id();
        let source = self.source(download.source_id)?;
        let dest = ChapterDestination::at(download.directory.clone());
        dest.ensure_dir().await?;

        let key = download.cache_key();
        let pages = self.load_pages(source.as_ref(), download, &dest, &key).await?;
        let total = pages.len();
        self.queue.set_pages(id, pages.clone())?;

        let job = PageJob {
            engine: self,
            source: source.as_ref(),
            chapter_id: id,
            dest: &dest,
            existing: dest.existing_images().await?,
        };

        let job = &job;
        let mut resolved = stream::iter(pages)
            .map(move |page| job.resolve(page))
            .buffered(self.config.url_lookahead.max(1));
        let mut finished = Vec::with_capacity(total);
        while let Some(page) = resolved.next().await {
            finished.push(job.fetch(page).await);
        }

        dest.write_index(&finished).await?;
        if let Err(e) = self.cache.put_page_list(&key, &finished).await {
            warn!(target: "tanko.download", chapter_id = %id, error = %e, "Failed to persist page list");
        }

        let files = dest.count_files().await?;
        Ok(ChapterSummary {
            status: aggregate_status(&finished, files),
            total,
            failed: finished.iter().filter(|p| p.status == PageStatus::Error).count(),
            files,
        })
    }

    /// Page list from memory, the metadata cache, the chapter's page index,
    /// or the source, in that order. Lists not already cached are persisted
    /// before any image is fetched.
    async fn load_pages(
        &self,
        source: &dyn SourcePort,
        download: &Download,
        dest: &ChapterDestination,
        key: &str,
    ) -> DownloadResult<Vec<Page>> {
        let (pages, cached) = if let Some(pages) = download.pages.clone() {
            (pages, true)
        } else if let Some(pages) = self.cache.get_page_list(key).await {
            (pages, true)
        } else if let Some(pages) = dest.read_index().await {
            (pages, false)
        } else {
            let stubs = source
                .page_list(&download.chapter)
                .await
                .map_err(source_error)?;
            debug!(
                target: "tanko.download",
                chapter_id = %download.id(),
                pages = stubs.len(),
                "Fetched page list"
            );
            (stubs.into_iter().map(Page::from).collect(), false)
        };

        if pages.is_empty() {
            return Err(DownloadError::empty_page_list(download.chapter.name.clone()));
        }
        if !cached {
            if let Err(e) = self.cache.put_page_list(key, &pages).await {
                warn!(target: "tanko.download", chapter_id = %download.id(), error = %e, "Failed to cache page list");
            }
        }

        // Every attempt starts from fresh page state; files on disk decide
        // what is already done.
        Ok(pages
            .into_iter()
            .map(|p| Page::new(p.index, p.source_url, p.image_url))
            .collect())
    }
}

/// Shared context for the pages of one chapter.
struct PageJob<'a> {
    engine: &'a EngineInner,
    source: &'a dyn SourcePort,
    chapter_id: ChapterId,
    dest: &'a ChapterDestination,
    existing: HashMap<u32, PathBuf>,
}

impl PageJob<'_> {
    /// Make sure the page knows its image URL.
    async fn resolve(&self, mut page: Page) -> Page {
        if page.image_url.is_some() || self.existing.contains_key(&page.index) {
            return page;
        }
        self.transition(&mut page, PageStatus::LoadingPageUrl);
        match self.source.image_url(&page).await {
            Ok(url) => page.image_url = Some(url),
            Err(e) => {
                warn!(
                    target: "tanko.download",
                    chapter_id = %self.chapter_id,
                    page = page.index,
                    error = %e,
                    "Could not resolve image URL"
                );
                page.fail();
                self.publish(&page);
            }
        }
        page
    }

    /// Put the page image in the chapter directory.
    async fn fetch(&self, mut page: Page) -> Page {
        if page.status == PageStatus::Error {
            return page;
        }
        if let Some(path) = self.existing.get(&page.index) {
            page.image_path = Some(path.clone());
            self.transition(&mut page, PageStatus::Ready);
            return page;
        }
        let Some(url) = page.image_url.clone() else {
            page.fail();
            self.publish(&page);
            return page;
        };

        let target = self.dest.image_path(page.index, &url);
        self.transition(&mut page, PageStatus::DownloadingImage);
        match self.obtain_image(&mut page, &url, &target).await {
            Ok(()) => {
                page.image_path = Some(target);
                self.transition(&mut page, PageStatus::Ready);
            }
            Err(e) => {
                warn!(
                    target: "tanko.download",
                    chapter_id = %self.chapter_id,
                    page = page.index,
                    error = %e,
                    "Page image failed"
                );
                page.fail();
                self.publish(&page);
            }
        }
        page
    }

    /// Cached copy first, then the source with retries.
    async fn obtain_image(&self, page: &mut Page, url: &str, target: &Path) -> DownloadResult<()> {
        match self.engine.cache.copy_image_to(url, target).await {
            Ok(true) => {
                debug!(target: "tanko.download", chapter_id = %self.chapter_id, page = page.index, "Image served from cache");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                debug!(target: "tanko.download", chapter_id = %self.chapter_id, page = page.index, error = %e, "Cached image unusable");
            }
        }

        let attempts = self.engine.config.image_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.stream_image(page, url, target).await {
                Ok(()) => break,
                Err(e) if e.is_recoverable() && attempt < attempts => {
                    let delay = self.engine.config.backoff(attempt);
                    debug!(
                        target: "tanko.download",
                        chapter_id = %self.chapter_id,
                        page = page.index,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying page image"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        // The chapter file is the result; the cache copy only saves a
        // later fetch.
        if let Err(e) = self.engine.cache.put_image_file(url, target).await {
            debug!(target: "tanko.download", chapter_id = %self.chapter_id, page = page.index, error = %e, "Could not cache page image");
        }
        Ok(())
    }

    /// One attempt: source stream into the chapter directory.
    async fn stream_image(&self, page: &mut Page, url: &str, target: &Path) -> DownloadResult<()> {
        let body = self.source.image_stream(url).await.map_err(source_error)?;

        let queue = &self.engine.queue;
        let chapter_id = self.chapter_id;
        let mut throttle = ProgressThrottle::new(self.engine.config.progress_interval);
        let mut progress = page.clone();
        progress.progress = 0;
        self.dest
            .write_image(target, body, |done, total| {
                let percent = percent_of(done, total);
                if throttle.should_emit(percent) {
                    progress.progress = percent;
                    let _ = queue.update_page(chapter_id, &progress);
                }
            })
            .await?;
        page.progress = progress.progress;
        Ok(())
    }

    fn transition(&self, page: &mut Page, next: PageStatus) {
        if let Err(e) = page.set_status(next) {
            debug!(target: "tanko.download", chapter_id = %self.chapter_id, error = %e, "Ignoring page transition");
        }
        self.publish(page);
    }

    fn publish(&self, page: &Page) {
        if let Err(e) = self.engine.queue.update_page(self.chapter_id, page) {
            debug!(target: "tanko.download", chapter_id = %self.chapter_id, error = %e, "Page update dropped");
        }
    }
}
