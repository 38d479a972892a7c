//! Subcommands.

use clap::Subcommand;

use crate::cache_commands::CacheCommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download chapters, given their manifest URLs, into the downloads directory
    Download {
        /// Chapter manifest URLs, downloaded in the order given
        #[arg(required = true)]
        chapter_urls: Vec<String>,
        /// Manga title, used for the manga directory
        #[arg(short, long)]
        manga: String,
        /// Source display name, used for the source directory
        #[arg(long, default_value = "Manifest")]
        source_name: String,
        /// Base URL relative chapter URLs resolve against (defaults to the
        /// first chapter URL's origin)
        #[arg(long)]
        base_url: Option<String>,
        /// Concurrent chapter downloads
        #[arg(short, long, env = "TANKO_WORKERS")]
        workers: Option<u32>,
        /// Attempts per page image
        #[arg(long, env = "TANKO_RETRIES")]
        retries: Option<u32>,
        /// Bearer token sent to the source
        #[arg(long, env = "TANKO_SOURCE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Inspect or clear the chapter disk cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Show resolved directories and limits
    Paths,
}
