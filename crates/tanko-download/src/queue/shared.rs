//! Thread-safe queue handle with event fan-out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tanko_core::{ChapterId, DownloadEvent, DownloadResult, DownloadStatus, Page};
use tokio::sync::{broadcast, watch};

use super::{Download, DownloadQueue};

/// Buffered events per subscriber before the oldest are dropped.
pub const EVENT_CAPACITY: usize = 1024;

/// [`DownloadQueue`] behind a mutex, publishing every change.
///
/// Events are sent while the lock is held, so subscribers observe them in
/// the order the changes happened. The lock is never held across an await.
#[derive(Clone)]
pub struct SharedQueue {
    inner: Arc<Inner>,
}

struct Inner {
    queue: Mutex<DownloadQueue>,
    events: broadcast::Sender<DownloadEvent>,
    busy: watch::Sender<bool>,
}

impl std::fmt::Debug for SharedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedQueue")
            .field("len", &self.len())
            .field("subscribers", &self.inner.events.receiver_count())
            .finish()
    }
}

impl Default for SharedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedQueue {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    /// Queue whose subscribers lag after `capacity` unread events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (busy, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(DownloadQueue::new()),
                events,
                busy,
            }),
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.events.subscribe()
    }

    /// `true` while anything is queued or in flight.
    pub fn busy(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    /// Publish an event that is not tied to a queue mutation.
    pub fn publish(&self, event: DownloadEvent) {
        let _guard = self.lock();
        self.send(event);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: ChapterId) -> bool {
        self.lock().contains(id)
    }

    pub fn get(&self, id: ChapterId) -> Option<Download> {
        self.lock().get(id).cloned()
    }

    /// Copy of every entry in queue order.
    pub fn snapshot(&self) -> Vec<Download> {
        self.lock().iter().cloned().collect()
    }

    pub fn ids_with_status(&self, status: DownloadStatus) -> Vec<ChapterId> {
        self.lock().ids_with_status(status)
    }

    pub fn has_pending_work(&self) -> bool {
        self.lock().has_pending_work()
    }

    pub fn add(&self, download: Download) -> bool {
        self.mutate(|queue| {
            let event = queue.add(download);
            let added = event.is_some();
            (added, event.into_iter().collect())
        })
    }

    pub fn remove(&self, id: ChapterId) -> DownloadResult<Download> {
        self.mutate(|queue| match queue.remove(id) {
            Ok((download, event)) => (Ok(download), vec![event]),
            Err(e) => (Err(e), Vec::new()),
        })
    }

    pub fn set_status(
        &self,
        id: ChapterId,
        status: DownloadStatus,
        error: Option<String>,
    ) -> DownloadResult<()> {
        self.mutate(|queue| single(queue.set_status(id, status, error)))
    }

    pub fn begin(&self, id: ChapterId) -> Option<Download> {
        self.mutate(|queue| match queue.begin(id) {
            Some((download, event)) => (Some(download), vec![event]),
            None => (None, Vec::new()),
        })
    }

    pub fn set_pages(&self, id: ChapterId, pages: Vec<Page>) -> DownloadResult<()> {
        self.mutate(|queue| single(queue.set_pages(id, pages)))
    }

    pub fn update_page(&self, id: ChapterId, page: &Page) -> DownloadResult<()> {
        self.mutate(|queue| match queue.update_page(id, page) {
            Ok(events) => (Ok(()), events),
            Err(e) => (Err(e), Vec::new()),
        })
    }

    pub fn retry(&self, id: ChapterId) -> DownloadResult<()> {
        self.mutate(|queue| single(queue.retry(id)))
    }

    /// Remove every entry that is not in flight; returns how many went.
    pub fn clear(&self) -> usize {
        self.mutate(|queue| {
            let events = queue.clear();
            (events.len(), events)
        })
    }

    fn lock(&self) -> MutexGuard<'_, DownloadQueue> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut DownloadQueue) -> (R, Vec<DownloadEvent>)) -> R {
        let mut queue = self.lock();
        let (result, events) = f(&mut queue);
        for event in events {
            self.send(event);
        }
        let busy = queue.has_pending_work();
        self.inner.busy.send_if_modified(|current| {
            let changed = *current != busy;
            *current = busy;
            changed
        });
        result
    }

    fn send(&self, event: DownloadEvent) {
        // No subscribers is fine; events are fire-and-forget.
        let _ = self.inner.events.send(event);
    }
}

fn single(result: DownloadResult<DownloadEvent>) -> (DownloadResult<()>, Vec<DownloadEvent>) {
    match result {
        Ok(event) => (Ok(()), vec![event]),
        Err(e) => (Err(e), Vec::new()),
    }
}
