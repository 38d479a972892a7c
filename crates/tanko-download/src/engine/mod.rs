//! Download engine.
//!
//! `DownloadEngine` owns the shared queue and a [`DynamicScheduler`] whose
//! worker count follows [`PreferencesPort::download_workers`]. Each job is
//! one chapter id; the worker pipeline lives in `worker`.
//!
//! # Lifecycle
//!
//! - [`enqueue`](DownloadEngine::enqueue) adds chapters (complete chapters on
//!   disk go straight to `Downloaded`)
//! - [`redownload`](DownloadEngine::redownload) wipes chapters and queues
//!   them again
//! - [`start`](DownloadEngine::start) feeds every queued chapter, and later
//!   enqueues, to the scheduler
//! - [`stop`](DownloadEngine::stop) cancels: in-flight chapters end `Error`,
//!   queued ones stay `Queued` for the next start
//!
//! # Lock order
//!
//! The run-state mutex is taken before the queue mutex, never the reverse.

mod config;
mod paths;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::stream;
use tanko_cache::{CacheError, ChapterMetadataCache, chapter_key};
use tanko_core::{
    Chapter, ChapterId, ChapterNotice, DownloadError, DownloadEvent, DownloadResult,
    DownloadStatus, Manga, NotifierPort, PreferencesPort, SourceError, SourceId, SourcePort,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{Download, SharedQueue};
use crate::scheduler::{DynamicScheduler, SchedulerError, SchedulerHandle};

pub use config::EngineConfig;
pub use paths::ChapterDestination;

/// Result of running one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    /// Every page is on disk; the chapter left the queue.
    Downloaded { chapter_id: ChapterId },
    /// The chapter stays in the queue with status `Error`.
    Failed {
        chapter_id: ChapterId,
        error: DownloadError,
    },
    /// The chapter was not `Queued` when a worker reached it.
    Skipped { chapter_id: ChapterId },
}

impl ChapterOutcome {
    pub const fn chapter_id(&self) -> ChapterId {
        match self {
            Self::Downloaded { chapter_id }
            | Self::Failed { chapter_id, .. }
            | Self::Skipped { chapter_id } => *chapter_id,
        }
    }

    pub const fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }
}

/// What [`DownloadEngine::enqueue`] did with each chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Newly added with status `Queued`.
    pub queued: Vec<ChapterId>,
    /// Already present in the queue; left untouched.
    pub already_queued: Vec<ChapterId>,
    /// Found complete on disk; not queued.
    pub already_downloaded: Vec<ChapterId>,
}

/// Collaborators of the engine.
pub struct EngineDeps {
    pub sources: Vec<Arc<dyn SourcePort>>,
    pub cache: ChapterMetadataCache,
    pub preferences: Arc<dyn PreferencesPort>,
    pub notifier: Arc<dyn NotifierPort>,
    pub config: EngineConfig,
}

struct RunState {
    generation: u64,
    jobs: mpsc::UnboundedSender<ChapterId>,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

struct EngineInner {
    sources: HashMap<SourceId, Arc<dyn SourcePort>>,
    cache: ChapterMetadataCache,
    preferences: Arc<dyn PreferencesPort>,
    notifier: Arc<dyn NotifierPort>,
    config: EngineConfig,
    queue: SharedQueue,
    finished: broadcast::Sender<ChapterOutcome>,
    run: Mutex<Option<RunState>>,
    generation: AtomicU64,
    scheduler_error: Mutex<Option<SchedulerError>>,
}

impl EngineInner {
    fn source(&self, id: SourceId) -> DownloadResult<Arc<dyn SourcePort>> {
        self.sources
            .get(&id)
            .cloned()
            .ok_or_else(|| DownloadError::other(format!("unknown source {id}")))
    }

    fn run_state(&self) -> MutexGuard<'_, Option<RunState>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scheduler_error_slot(&self) -> MutexGuard<'_, Option<SchedulerError>> {
        self.scheduler_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Chapter download engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct DownloadEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("sources", &self.inner.sources.len())
            .field("queue", &self.inner.queue)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    pub fn new(deps: EngineDeps) -> Self {
        let sources = deps
            .sources
            .into_iter()
            .map(|source| (source.id(), source))
            .collect();
        let (finished, _) = broadcast::channel(deps.config.event_capacity.max(1));
        Self {
            inner: Arc::new(EngineInner {
                sources,
                cache: deps.cache,
                preferences: deps.preferences,
                notifier: deps.notifier,
                queue: SharedQueue::with_capacity(deps.config.event_capacity),
                config: deps.config,
                finished,
                run: Mutex::new(None),
                generation: AtomicU64::new(0),
                scheduler_error: Mutex::new(None),
            }),
        }
    }

    /// Queue chapters of one manga from one source.
    ///
    /// Idempotent per chapter. Chapters whose directory already holds every
    /// page plus the page index are reported as downloaded without any
    /// network call. Fails only for an unknown source.
    pub async fn enqueue(
        &self,
        manga: &Manga,
        source_id: SourceId,
        chapters: &[Chapter],
    ) -> DownloadResult<EnqueueReport> {
        self.enqueue_chapters(manga, source_id, chapters, false).await
    }

    /// Download chapters again from scratch.
    ///
    /// Each chapter's directory, cached page list and cached images are
    /// deleted before it is queued, so every page is fetched from the
    /// source. A chapter that is `Error` or `Downloaded` in the queue is
    /// taken out and re-queued; one that is queued or in flight is left
    /// alone and reported as already queued.
    pub async fn redownload(
        &self,
        manga: &Manga,
        source_id: SourceId,
        chapters: &[Chapter],
    ) -> DownloadResult<EnqueueReport> {
        self.enqueue_chapters(manga, source_id, chapters, true).await
    }

    async fn enqueue_chapters(
        &self,
        manga: &Manga,
        source_id: SourceId,
        chapters: &[Chapter],
        fresh: bool,
    ) -> DownloadResult<EnqueueReport> {
        let source = self.inner.source(source_id)?;
        let root = self.inner.preferences.downloads_dir();
        let mut report = EnqueueReport::default();

        for chapter in chapters {
            if let Some(existing) = self.inner.queue.get(chapter.id) {
                let replaceable = fresh
                    && existing.status.is_terminal()
                    && self.inner.queue.remove(chapter.id).is_ok();
                if !replaceable {
                    report.already_queued.push(chapter.id);
                    continue;
                }
            }

            let dest = ChapterDestination::plan(&root, source.name(), manga, chapter);
            let key = chapter_key(source_id, &chapter.url);
            if fresh {
                self.discard_chapter(chapter.id, &dest, &key).await?;
            } else if self.is_complete_on_disk(&dest, &key).await {
                debug!(target: "tanko.download", chapter_id = %chapter.id, "Chapter already on disk");
                self.inner
                    .queue
                    .publish(DownloadEvent::status(chapter.id, DownloadStatus::Downloaded));
                self.inner.notifier.notify(chapter.id, ChapterNotice::Done);
                report.already_downloaded.push(chapter.id);
                continue;
            }

            let download = Download::new(
                chapter.clone(),
                manga.clone(),
                source_id,
                source.name(),
                dest.dir,
            );
            let run = self.inner.run_state();
            if self.inner.queue.add(download) {
                if let Some(state) = run.as_ref() {
                    let _ = state.jobs.send(chapter.id);
                }
                drop(run);
                self.inner.notifier.notify(chapter.id, ChapterNotice::Queued);
                report.queued.push(chapter.id);
            } else {
                report.already_queued.push(chapter.id);
            }
        }

        info!(
            target: "tanko.download",
            manga = %manga.title,
            fresh,
            queued = report.queued.len(),
            already_queued = report.already_queued.len(),
            already_downloaded = report.already_downloaded.len(),
            "Enqueued chapters"
        );
        Ok(report)
    }

    /// Start processing the queue. Returns `false` if already running.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut run = self.inner.run_state();
        if run.is_some() {
            return false;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (jobs, jobs_rx) = mpsc::unbounded_channel();
        for id in self.inner.queue.ids_with_status(DownloadStatus::Queued) {
            let _ = jobs.send(id);
        }
        let job_stream = stream::unfold(jobs_rx, |mut rx| async move {
            rx.recv().await.map(|id| (id, rx))
        });

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = DynamicScheduler::spawn(
            job_stream,
            self.inner.preferences.download_workers(),
            &cancel,
            move |id: ChapterId| {
                let inner = Arc::clone(&inner);
                let token = token.clone();
                async move { inner.run_chapter(id, &token).await }
            },
        );
        let driver = tokio::spawn(drive(Arc::clone(&self.inner), handle, generation));

        *run = Some(RunState {
            generation,
            jobs,
            cancel,
            driver,
        });
        self.inner.scheduler_error_slot().take();
        info!(target: "tanko.download", generation, "Download engine started");
        true
    }

    /// Stop processing and wait for in-flight chapters to settle.
    ///
    /// No new chapter is admitted; chapters in flight end `Error`; queued
    /// chapters stay `Queued`.
    pub async fn stop(&self) {
        let state = self.inner.run_state().take();
        let Some(state) = state else {
            return;
        };
        state.cancel.cancel();
        drop(state.jobs);
        if let Err(e) = state.driver.await {
            warn!(target: "tanko.download", error = %e, "Engine driver ended abnormally");
        }
        info!(target: "tanko.download", generation = state.generation, "Download engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.run_state().is_some()
    }

    /// Run one queued chapter on the calling task.
    ///
    /// Uses the running engine's cancellation when started. A chapter that
    /// is not `Queued` is skipped.
    pub async fn run_one(&self, chapter_id: ChapterId) -> ChapterOutcome {
        let cancel = self
            .inner
            .run_state()
            .as_ref()
            .map_or_else(CancellationToken::new, |state| state.cancel.clone());
        let outcome = self.inner.run_chapter(chapter_id, &cancel).await;
        let _ = self.inner.finished.send(outcome.clone());
        outcome
    }

    /// Re-queue an `Error` (or lingering `Downloaded`) chapter.
    ///
    /// Failed pages go back to `Queued`; pages on disk are kept.
    pub fn retry(&self, chapter_id: ChapterId) -> DownloadResult<()> {
        let run = self.inner.run_state();
        self.inner.queue.retry(chapter_id)?;
        if let Some(state) = run.as_ref() {
            let _ = state.jobs.send(chapter_id);
        }
        drop(run);
        self.inner.notifier.notify(chapter_id, ChapterNotice::Queued);
        info!(target: "tanko.download", chapter_id = %chapter_id, "Chapter re-queued");
        Ok(())
    }

    /// Remove a chapter that is not being downloaded.
    pub fn remove(&self, chapter_id: ChapterId) -> DownloadResult<()> {
        self.inner.queue.remove(chapter_id)?;
        debug!(target: "tanko.download", chapter_id = %chapter_id, "Chapter removed from queue");
        Ok(())
    }

    /// Remove every chapter not in flight. Returns how many were removed.
    pub fn clear_queue(&self) -> usize {
        let removed = self.inner.queue.clear();
        debug!(target: "tanko.download", removed, "Queue cleared");
        removed
    }

    pub fn queue_snapshot(&self) -> Vec<Download> {
        self.inner.queue.snapshot()
    }

    /// Every queue event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.queue.subscribe()
    }

    /// One outcome per chapter a worker finished.
    pub fn subscribe_finished(&self) -> broadcast::Receiver<ChapterOutcome> {
        self.inner.finished.subscribe()
    }

    /// Nothing queued or in flight.
    pub fn is_idle(&self) -> bool {
        !self.inner.queue.has_pending_work()
    }

    /// Wait until nothing is queued or in flight.
    ///
    /// Never returns while queued chapters exist and the engine is stopped
    /// or paused at zero workers.
    pub async fn wait_idle(&self) {
        let mut busy = self.inner.queue.busy();
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    /// The infrastructure failure that stopped the last run, if any.
    pub fn scheduler_error(&self) -> Option<SchedulerError> {
        self.inner.scheduler_error_slot().clone()
    }

    /// Forget everything stored for one chapter: cached images, the cached
    /// page list and the chapter directory.
    async fn discard_chapter(
        &self,
        chapter_id: ChapterId,
        dest: &ChapterDestination,
        key: &str,
    ) -> DownloadResult<()> {
        let cache = &self.inner.cache;
        let pages = match cache.get_page_list(key).await {
            Some(pages) => pages,
            None => dest.read_index().await.unwrap_or_default(),
        };
        for url in pages.iter().filter_map(|p| p.image_url.as_deref()) {
            if let Err(e) = cache.remove_image(url).await {
                warn!(target: "tanko.download", chapter_id = %chapter_id, error = %e, "Failed to drop cached image");
            }
        }
        if let Err(e) = cache.remove_page_list(key).await {
            warn!(target: "tanko.download", chapter_id = %chapter_id, error = %e, "Failed to drop cached page list");
        }
        dest.remove_dir().await?;
        debug!(
            target: "tanko.download",
            chapter_id = %chapter_id,
            pages = pages.len(),
            "Discarded chapter for re-download"
        );
        Ok(())
    }

    async fn is_complete_on_disk(&self, dest: &ChapterDestination, key: &str) -> bool {
        if !dest.exists().await {
            return false;
        }
        let pages = match self.inner.cache.get_page_list(key).await {
            Some(pages) => pages,
            None => match dest.read_index().await {
                Some(pages) => pages,
                None => return false,
            },
        };
        !pages.is_empty()
            && dest
                .count_files()
                .await
                .is_ok_and(|files| files == pages.len() + 1)
    }
}

/// Forward scheduler results until the pool ends, then report how it ended.
async fn drive(inner: Arc<EngineInner>, mut handle: SchedulerHandle<ChapterOutcome>, generation: u64) {
    while let Some(outcome) = handle.next_result().await {
        if !inner.queue.has_pending_work() {
            inner.queue.publish(DownloadEvent::QueueDrained);
        }
        let _ = inner.finished.send(outcome);
    }

    let failure = handle.join().await.err();
    if let Some(err) = &failure {
        error!(target: "tanko.download", error = %err, "Download scheduler failed, stopping engine");
        *inner.scheduler_error_slot() = Some(err.clone());

        {
            let mut run = inner.run_state();
            if run.as_ref().is_some_and(|state| state.generation == generation) {
                if let Some(state) = run.take() {
                    state.cancel.cancel();
                }
            }
        }

        // Workers were torn down with the pool; nothing will finish these.
        let message = DownloadError::from(err.clone()).to_string();
        for id in inner.queue.ids_with_status(DownloadStatus::Downloading) {
            if inner
                .queue
                .set_status(id, DownloadStatus::Error, Some(message.clone()))
                .is_ok()
            {
                inner.notifier.notify(id, ChapterNotice::Error { message: message.clone() });
            }
        }
    }

    inner.queue.publish(DownloadEvent::EngineStopped {
        error: failure.map(|e| e.to_string()),
    });
}

fn source_error(err: SourceError) -> DownloadError {
    CacheError::from(err).into()
}
