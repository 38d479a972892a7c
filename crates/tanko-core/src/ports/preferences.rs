//! Preferences provider port.

use std::path::{Path, PathBuf};

use tokio::sync::watch;

/// Live user preferences consumed by the download engine.
pub trait PreferencesPort: Send + Sync {
    /// Desired number of concurrent download workers.
    ///
    /// The receiver always holds the latest value; `0` pauses new work.
    fn download_workers(&self) -> watch::Receiver<usize>;

    /// Root directory that chapter directories are created under.
    fn downloads_dir(&self) -> PathBuf;

    /// Byte budget for the chapter disk cache.
    fn cache_size_limit(&self) -> u64;
}

/// In-memory preferences backed by a `watch` channel.
///
/// Used by the CLI and by tests to drive the worker count at runtime.
#[derive(Debug)]
pub struct WatchPreferences {
    workers: watch::Sender<usize>,
    downloads_dir: PathBuf,
    cache_size_limit: u64,
}

impl WatchPreferences {
    pub fn new(workers: usize, downloads_dir: impl Into<PathBuf>, cache_size_limit: u64) -> Self {
        let (workers, _) = watch::channel(workers);
        Self {
            workers,
            downloads_dir: downloads_dir.into(),
            cache_size_limit,
        }
    }

    /// Publish a new desired worker count to every subscriber.
    pub fn set_download_workers(&self, count: usize) {
        self.workers.send_replace(count);
    }

    #[must_use]
    pub fn current_workers(&self) -> usize {
        *self.workers.borrow()
    }

    #[must_use]
    pub fn downloads_path(&self) -> &Path {
        &self.downloads_dir
    }
}

impl PreferencesPort for WatchPreferences {
    fn download_workers(&self) -> watch::Receiver<usize> {
        self.workers.subscribe()
    }

    fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir.clone()
    }

    fn cache_size_limit(&self) -> u64 {
        self.cache_size_limit
    }
}
