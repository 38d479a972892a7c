//! Cache command handlers.

use anyhow::Result;
use indicatif::HumanBytes;
use tanko_cache::ChapterMetadataCache;

use crate::bootstrap::{CliConfig, open_cache};
use crate::cache_commands::CacheCommand;

/// Snapshot reported by `tanko cache info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub entries: usize,
    pub size: u64,
    pub capacity: u64,
}

pub async fn info(cache: &ChapterMetadataCache) -> CacheInfo {
    let blobs = cache.blobs();
    CacheInfo {
        entries: blobs.len().await,
        size: blobs.size_on_disk().await,
        capacity: blobs.capacity().await,
    }
}

pub async fn execute(config: &CliConfig, command: CacheCommand) -> Result<()> {
    let cache = open_cache(config).await?;

    match command {
        CacheCommand::Info => {
            let info = info(&cache).await;
            println!("Cache: {}", cache.blobs().directory().display());
            println!("  Entries: {}", info.entries);
            println!(
                "  Size:    {} of {}",
                HumanBytes(info.size),
                HumanBytes(info.capacity)
            );
        }
        CacheCommand::Clear => {
            let before = info(&cache).await;
            cache.clear().await.map_err(crate::CliError::from)?;
            println!(
                "✓ Removed {} entries ({})",
                before.entries,
                HumanBytes(before.size)
            );
        }
        CacheCommand::Remove { file } => {
            let removed = cache
                .blobs()
                .remove_file(&file)
                .await
                .map_err(crate::CliError::from)?;
            if removed {
                println!("✓ Removed {file}");
            } else {
                println!("No cache entry named {file}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tanko_core::Settings;

    fn config_in(dir: &std::path::Path) -> CliConfig {
        CliConfig::from_settings(Settings {
            cache_dir: Some(dir.to_string_lossy().into_owned()),
            downloads_dir: Some(dir.join("dl").to_string_lossy().into_owned()),
            ..Settings::with_defaults()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn info_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());

        let cache = open_cache(&config).await.unwrap();
        cache.blobs().put("a", b"12345").await.unwrap();
        cache.blobs().put("b", b"678").await.unwrap();
        assert_eq!(
            info(&cache).await,
            CacheInfo {
                entries: 2,
                size: 8,
                capacity: config.cache_size(),
            }
        );
        drop(cache);

        execute(&config, CacheCommand::Clear).await.unwrap();
        let reopened = open_cache(&config).await.unwrap();
        assert_eq!(info(&reopened).await.entries, 0);
    }

    #[tokio::test]
    async fn removing_a_reserved_name_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let err = execute(
            &config,
            CacheCommand::Remove {
                file: "journal".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(crate::error::exit_code_of(&err), 2);
    }
}
