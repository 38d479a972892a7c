//! Main CLI parser and top-level argument handling.

use clap::Parser;
use tanko_core::{Settings, SettingsUpdate};

use crate::commands::Commands;

/// Download manga chapters from JSON-manifest sources.
#[derive(Parser, Debug)]
#[command(name = "tanko")]
#[command(version, about = "Download manga chapters for offline reading")]
pub struct Cli {
    /// Root directory for downloaded chapters
    #[arg(long = "downloads-dir", env = "TANKO_DOWNLOADS_DIR", global = true)]
    pub downloads_dir: Option<String>,

    /// Directory of the chapter disk cache
    #[arg(long = "cache-dir", env = "TANKO_CACHE_DIR", global = true)]
    pub cache_dir: Option<String>,

    /// Byte budget of the disk cache, in MiB
    #[arg(long = "cache-size-mb", env = "TANKO_CACHE_SIZE_MB", global = true)]
    pub cache_size_mb: Option<u64>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Defaults overlaid with every setting given on the command line or in
    /// the environment.
    pub fn settings(&self) -> Settings {
        let mut update = SettingsUpdate {
            downloads_dir: self.downloads_dir.clone().map(Some),
            cache_dir: self.cache_dir.clone().map(Some),
            cache_size_bytes: self
                .cache_size_mb
                .map(|mb| Some(mb.saturating_mul(1024 * 1024))),
            ..SettingsUpdate::default()
        };
        if let Some(Commands::Download {
            workers, retries, ..
        }) = &self.command
        {
            update.download_workers = workers.map(Some);
            update.image_retries = retries.map(Some);
        }

        let mut settings = Settings::with_defaults();
        settings.merge(&update);
        settings
    }
}
