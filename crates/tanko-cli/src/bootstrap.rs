//! CLI bootstrap - the composition root.
//!
//! This is the only place where the cache, the preferences provider, the
//! sources and the download engine are instantiated and wired together.
//! Handlers receive the composed [`CliContext`].

use std::path::PathBuf;
use std::sync::Arc;

use tanko_cache::{ChapterMetadataCache, DiskBlobCache};
use tanko_core::{
    ChapterId, ChapterNotice, NotifierPort, Settings, SourcePort, WatchPreferences,
    resolve_cache_dir, resolve_downloads_dir, validate_settings,
};
use tanko_download::{DownloadEngine, EngineConfig, EngineDeps};
use tracing::{info, warn};

use crate::error::CliError;

/// Validated settings with every directory resolved.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub settings: Settings,
    pub downloads_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl CliConfig {
    pub fn from_settings(settings: Settings) -> Result<Self, CliError> {
        validate_settings(&settings)?;
        let downloads_dir = resolve_downloads_dir(settings.downloads_dir.as_deref())?;
        let cache_dir = resolve_cache_dir(settings.cache_dir.as_deref())?;
        Ok(Self {
            settings,
            downloads_dir,
            cache_dir,
        })
    }

    pub fn workers(&self) -> usize {
        usize::try_from(self.settings.effective_download_workers()).unwrap_or(usize::MAX)
    }

    pub const fn cache_size(&self) -> u64 {
        self.settings.effective_cache_size()
    }
}

/// Fully composed context for the download command.
pub struct CliContext {
    pub config: CliConfig,
    pub engine: DownloadEngine,
    pub cache: ChapterMetadataCache,
    pub preferences: Arc<WatchPreferences>,
}

/// Forwards chapter milestones to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotifierPort for LogNotifier {
    fn notify(&self, chapter_id: ChapterId, notice: ChapterNotice) {
        match notice {
            ChapterNotice::Error { message } => {
                warn!(target: "tanko.cli", %chapter_id, %message, "Chapter failed");
            }
            other => info!(target: "tanko.cli", %chapter_id, notice = ?other, "Chapter update"),
        }
    }
}

/// Open the disk cache with the configured budget.
pub async fn open_cache(config: &CliConfig) -> Result<ChapterMetadataCache, CliError> {
    let blobs = DiskBlobCache::open(&config.cache_dir, config.cache_size()).await?;
    Ok(ChapterMetadataCache::new(blobs))
}

/// Bootstrap the download engine over `sources`.
pub async fn bootstrap(
    config: CliConfig,
    sources: Vec<Arc<dyn SourcePort>>,
) -> Result<CliContext, CliError> {
    let cache = open_cache(&config).await?;
    let preferences = Arc::new(WatchPreferences::new(
        config.workers(),
        config.downloads_dir.clone(),
        config.cache_size(),
    ));

    let engine = DownloadEngine::new(EngineDeps {
        sources,
        cache: cache.clone(),
        preferences: preferences.clone(),
        notifier: Arc::new(LogNotifier),
        config: EngineConfig::from_settings(&config.settings),
    });

    Ok(CliContext {
        config,
        engine,
        cache,
        preferences,
    })
}
