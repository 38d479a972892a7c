//! Shared fakes and helpers for engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mockall::mock;
use tanko_cache::{ChapterMetadataCache, DiskBlobCache};
use tanko_core::{
    Chapter, ChapterId, ChapterNotice, DownloadEvent, DownloadStatus, ImageStream, Manga,
    NoopNotifier, NotifierPort, Page, PageStub, SourceError, SourceId, SourcePort,
    WatchPreferences,
};
use tanko_download::{ChapterOutcome, DownloadEngine, EngineConfig, EngineDeps};
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const SOURCE_ID: SourceId = SourceId(7);

mock! {
    pub Notifier {}

    impl NotifierPort for Notifier {
        fn notify(&self, chapter_id: ChapterId, notice: ChapterNotice);
    }
}

pub fn manga() -> Manga {
    Manga::new(1, "Test Manga")
}

pub fn chapter(id: i64) -> Chapter {
    Chapter::new(id, 1, format!("/chapter/{id}"), format!("Chapter {id}"))
}

pub fn image_url(chapter: &Chapter, index: u32) -> String {
    format!("https://img.test/{}/{index}.jpg", chapter.id)
}

fn image_bytes(index: u32) -> Vec<u8> {
    vec![u8::try_from(index % 251).unwrap(); 64]
}

/// Scripted source: page lists, image bytes, and injected failures.
#[derive(Default)]
pub struct FakeSource {
    chapters: Mutex<HashMap<String, Vec<PageStub>>>,
    page_images: Mutex<HashMap<String, String>>,
    images: Mutex<HashMap<String, Vec<u8>>>,
    failing_page_lists: Mutex<HashSet<String>>,
    image_failures: Mutex<HashMap<String, u32>>,
    image_delay: Mutex<Duration>,
    pub page_list_calls: AtomicUsize,
    pub image_url_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chapter whose page list already carries image URLs.
    pub fn with_chapter(self, chapter: &Chapter, pages: u32) -> Self {
        let stubs = (0..pages)
            .map(|i| {
                let url = image_url(chapter, i);
                self.images.lock().unwrap().insert(url.clone(), image_bytes(i));
                PageStub::with_image(i, url)
            })
            .collect();
        self.chapters.lock().unwrap().insert(chapter.url.clone(), stubs);
        self
    }

    /// Chapter whose image URLs must be scraped from page URLs.
    pub fn with_lazy_chapter(self, chapter: &Chapter, pages: u32) -> Self {
        let stubs = (0..pages)
            .map(|i| {
                let page_url = format!("https://pages.test/{}/{i}", chapter.id);
                let url = image_url(chapter, i);
                self.images.lock().unwrap().insert(url.clone(), image_bytes(i));
                self.page_images.lock().unwrap().insert(page_url.clone(), url);
                PageStub::with_source(i, page_url)
            })
            .collect();
        self.chapters.lock().unwrap().insert(chapter.url.clone(), stubs);
        self
    }

    pub fn with_empty_chapter(self, chapter: &Chapter) -> Self {
        self.chapters.lock().unwrap().insert(chapter.url.clone(), Vec::new());
        self
    }

    pub fn failing_page_list(self, chapter: &Chapter) -> Self {
        self.failing_page_lists.lock().unwrap().insert(chapter.url.clone());
        self
    }

    /// Fail the next `times` requests for one image.
    pub fn failing_image(self, chapter: &Chapter, index: u32, times: u32) -> Self {
        self.image_failures
            .lock()
            .unwrap()
            .insert(image_url(chapter, index), times);
        self
    }

    /// Make one image answer "not found" for good.
    pub fn missing_image(self, chapter: &Chapter, index: u32) -> Self {
        self.images.lock().unwrap().remove(&image_url(chapter, index));
        self
    }

    pub fn with_image_delay(self, delay: Duration) -> Self {
        *self.image_delay.lock().unwrap() = delay;
        self
    }

    pub fn heal_image(&self, chapter: &Chapter, index: u32) {
        self.image_failures
            .lock()
            .unwrap()
            .remove(&image_url(chapter, index));
    }

    pub fn page_list_count(&self) -> usize {
        self.page_list_calls.load(Ordering::SeqCst)
    }

    pub fn image_count(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourcePort for FakeSource {
    fn id(&self) -> SourceId {
        SOURCE_ID
    }

    fn name(&self) -> &str {
        "Fake Source"
    }

    async fn page_list(&self, chapter: &Chapter) -> Result<Vec<PageStub>, SourceError> {
        self.page_list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_page_lists.lock().unwrap().contains(&chapter.url) {
            return Err(SourceError::http_status(500, "page list unavailable"));
        }
        self.chapters
            .lock()
            .unwrap()
            .get(&chapter.url)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(chapter.url.clone()))
    }

    async fn image_url(&self, page: &Page) -> Result<String, SourceError> {
        self.image_url_calls.fetch_add(1, Ordering::SeqCst);
        let page_url = page.source_url.clone().unwrap_or_default();
        self.page_images
            .lock()
            .unwrap()
            .get(&page_url)
            .cloned()
            .ok_or(SourceError::NotFound(page_url))
    }

    async fn image_stream(&self, image_url: &str) -> Result<ImageStream, SourceError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.image_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.image_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(image_url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::http_status(503, "image unavailable"));
                }
            }
        }
        let bytes = self
            .images
            .lock()
            .unwrap()
            .get(image_url)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(image_url.to_string()))?;
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        Ok(ImageStream::from_chunks(vec![
            Bytes::copy_from_slice(head),
            Bytes::copy_from_slice(tail),
        ]))
    }
}

/// Engine wired to a [`FakeSource`] with temp download and cache dirs.
pub struct Harness {
    pub engine: DownloadEngine,
    pub source: Arc<FakeSource>,
    pub prefs: Arc<WatchPreferences>,
    pub cache: ChapterMetadataCache,
    pub downloads: TempDir,
    pub cache_dir: TempDir,
}

impl Harness {
    pub async fn new(source: FakeSource, workers: usize) -> Self {
        Self::with_notifier(source, workers, Arc::new(NoopNotifier::new())).await
    }

    pub async fn with_notifier(
        source: FakeSource,
        workers: usize,
        notifier: Arc<dyn NotifierPort>,
    ) -> Self {
        let downloads = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let cache = ChapterMetadataCache::new(
            DiskBlobCache::open(cache_dir.path(), 16 << 20).await.unwrap(),
        );
        let prefs = Arc::new(WatchPreferences::new(workers, downloads.path(), 16 << 20));
        let source = Arc::new(source);
        let engine = DownloadEngine::new(EngineDeps {
            sources: vec![source.clone()],
            cache: cache.clone(),
            preferences: prefs.clone(),
            notifier,
            config: fast_config(),
        });
        Self {
            engine,
            source,
            prefs,
            cache,
            downloads,
            cache_dir,
        }
    }

    pub fn status_of(&self, id: i64) -> Option<DownloadStatus> {
        self.engine
            .queue_snapshot()
            .into_iter()
            .find(|d| d.chapter.id == ChapterId(id))
            .map(|d| d.status)
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_base_delay: Duration::ZERO,
        progress_interval: Duration::ZERO,
        ..EngineConfig::default()
    }
}

/// Next non-skipped outcome, failing the test after five seconds.
pub async fn next_outcome(rx: &mut broadcast::Receiver<ChapterOutcome>) -> ChapterOutcome {
    loop {
        let outcome = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a chapter to finish")
            .expect("outcome channel closed");
        if !matches!(outcome, ChapterOutcome::Skipped { .. }) {
            return outcome;
        }
    }
}

pub async fn outcomes(rx: &mut broadcast::Receiver<ChapterOutcome>, n: usize) -> Vec<ChapterOutcome> {
    let mut all = Vec::with_capacity(n);
    for _ in 0..n {
        all.push(next_outcome(rx).await);
    }
    all
}

/// Every event currently buffered for `rx`.
pub fn drain(rx: &mut broadcast::Receiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Tracks how many chapters are `Downloading` at once, from the event stream.
pub fn spawn_concurrency_probe(
    mut rx: broadcast::Receiver<DownloadEvent>,
) -> Arc<AtomicUsize> {
    let max = Arc::new(AtomicUsize::new(0));
    let seen = max.clone();
    tokio::spawn(async move {
        let mut active = 0usize;
        while let Ok(event) = rx.recv().await {
            if let DownloadEvent::StatusChanged { status, .. } = event {
                match status {
                    DownloadStatus::Downloading => {
                        active += 1;
                        seen.fetch_max(active, Ordering::SeqCst);
                    }
                    DownloadStatus::Downloaded | DownloadStatus::Error => {
                        active = active.saturating_sub(1);
                    }
                    _ => {}
                }
            }
        }
    });
    max
}

/// Poll `check` until it holds, failing after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
