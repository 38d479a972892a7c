//! Paths command handler.

use std::fmt;

use indicatif::HumanBytes;

use crate::bootstrap::CliConfig;

/// Everything `tanko paths` reports.
pub struct ResolvedPaths<'a>(pub &'a CliConfig);

impl fmt::Display for ResolvedPaths<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        writeln!(f, "downloads_dir = {}", config.downloads_dir.display())?;
        writeln!(f, "cache_dir = {}", config.cache_dir.display())?;
        writeln!(f, "cache_size = {}", HumanBytes(config.cache_size()))?;
        writeln!(f, "download_workers = {}", config.workers())?;
        write!(
            f,
            "image_retries = {}",
            config.settings.effective_image_retries()
        )
    }
}

pub fn execute(config: &CliConfig) {
    println!("{}", ResolvedPaths(config));
}
