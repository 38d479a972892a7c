//! Download command handler.
//!
//! Builds a [`DefaultManifestSource`] for the given chapter URLs, runs the
//! engine until its queue drains, and reports one line per chapter.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tanko_core::{
    Chapter, ChapterId, DownloadEvent, DownloadStatus, Manga, MangaId, Settings, SourceId,
    SourcePort,
};
use tanko_download::DownloadEngine;
use tanko_source::{DefaultManifestSource, SourceClientConfig, origin_of};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::bootstrap::{CliConfig, bootstrap};
use crate::error::CliError;
use crate::presentation::ChapterProgress;

/// The only source a CLI run registers.
pub const SOURCE_ID: SourceId = SourceId(1);

/// Download command arguments passed from CLI.
#[derive(Debug, Clone)]
pub struct DownloadArgs {
    pub chapter_urls: Vec<String>,
    pub manga: String,
    pub source_name: String,
    pub base_url: Option<String>,
    pub token: Option<String>,
}

/// How one chapter ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterResult {
    Downloaded,
    AlreadyOnDisk,
    Failed(String),
}

/// Display name for the chapter at `position` (0-based).
///
/// The last path segment without its extension; bare numbers become
/// `Chapter N`.
pub fn chapter_name(url: &str, position: usize) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = match path.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map_or("", |(_, p)| p),
        None => path,
    };
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let stem = match segment.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => segment,
    };

    if stem.is_empty() {
        format!("Chapter {}", position + 1)
    } else if stem.chars().all(|c| c.is_ascii_digit() || c == '.') {
        format!("Chapter {stem}")
    } else {
        stem.to_string()
    }
}

/// One chapter per URL with sequential ids and unique names.
pub fn plan_chapters(urls: &[String], manga_id: MangaId) -> Vec<Chapter> {
    let mut seen = HashSet::new();
    urls.iter()
        .enumerate()
        .map(|(position, url)| {
            let base = chapter_name(url, position);
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{base} ({n})");
                n += 1;
            }
            let id = i64::try_from(position + 1).unwrap_or(i64::MAX);
            Chapter::new(ChapterId(id), manga_id, url.trim(), name)
        })
        .collect()
}

pub async fn execute(settings: Settings, args: DownloadArgs) -> Result<()> {
    let config = CliConfig::from_settings(settings)?;
    if config.workers() == 0 {
        return Err(CliError::Arguments("--workers must be at least 1".to_string()).into());
    }

    let base_url = match args.base_url {
        Some(base) => base,
        None => {
            let first = args.chapter_urls.first().map_or("", String::as_str);
            origin_of(first).map_err(|e| CliError::Arguments(e.to_string()))?
        }
    };
    let source_config = SourceClientConfig::new().with_optional_token(args.token);
    let source = DefaultManifestSource::new(SOURCE_ID, args.source_name, &base_url, &source_config)
        .map_err(CliError::from)?;
    let source: Arc<dyn SourcePort> = Arc::new(source);

    let ctx = bootstrap(config, vec![source]).await?;
    let engine = ctx.engine;

    let manga = Manga::new(MangaId(1), args.manga);
    let chapters = plan_chapters(&args.chapter_urls, manga.id);
    let labels: HashMap<ChapterId, String> =
        chapters.iter().map(|c| (c.id, c.name.clone())).collect();

    let mut events = engine.subscribe();
    let report = engine
        .enqueue(&manga, SOURCE_ID, &chapters)
        .await
        .map_err(CliError::from)?;

    let mut progress = ChapterProgress::new(labels);
    let run = if report.queued.is_empty() {
        Ok(())
    } else {
        engine.start();
        let run = watch_until_drained(&engine, &mut events, &mut progress).await;
        engine.stop().await;
        run
    };
    while let Ok(event) = events.try_recv() {
        progress.apply(&event);
    }
    progress.finish();
    run?;

    let results = collect_results(&engine, &chapters, &report.already_downloaded);
    print_summary(&chapters, &results);

    let failed = results
        .values()
        .filter(|r| matches!(r, ChapterResult::Failed(_)))
        .count();
    if failed > 0 {
        return Err(CliError::ChaptersFailed {
            failed,
            total: chapters.len(),
        }
        .into());
    }
    Ok(())
}

/// Render events until no chapter is queued or downloading.
async fn watch_until_drained(
    engine: &DownloadEngine,
    events: &mut broadcast::Receiver<DownloadEvent>,
    progress: &mut ChapterProgress,
) -> Result<(), CliError> {
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => return Err(CliError::Interrupted),
            () = engine.wait_idle() => return Ok(()),
            event = events.recv() => match event {
                Ok(DownloadEvent::EngineStopped { error: Some(error) }) => {
                    return Err(CliError::Download(error));
                }
                Ok(event) => progress.apply(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "tanko.cli", skipped, "Progress display fell behind");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Final result per chapter, read from the drained queue.
///
/// Downloaded chapters leave the queue; failed ones stay with status `Error`.
fn collect_results(
    engine: &DownloadEngine,
    chapters: &[Chapter],
    already_on_disk: &[ChapterId],
) -> HashMap<ChapterId, ChapterResult> {
    let snapshot: HashMap<ChapterId, _> = engine
        .queue_snapshot()
        .into_iter()
        .map(|d| (d.id(), d))
        .collect();

    chapters
        .iter()
        .map(|chapter| {
            let result = if already_on_disk.contains(&chapter.id) {
                ChapterResult::AlreadyOnDisk
            } else {
                match snapshot.get(&chapter.id) {
                    None => ChapterResult::Downloaded,
                    Some(d) if d.status == DownloadStatus::Error => ChapterResult::Failed(
                        d.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                    ),
                    Some(d) => ChapterResult::Failed(format!("left {}", d.status)),
                }
            };
            (chapter.id, result)
        })
        .collect()
}

fn print_summary(chapters: &[Chapter], results: &HashMap<ChapterId, ChapterResult>) {
    println!();
    for chapter in chapters {
        match results.get(&chapter.id) {
            Some(ChapterResult::Downloaded) => println!("✓ {}", chapter.name),
            Some(ChapterResult::AlreadyOnDisk) => {
                println!("✓ {} (already downloaded)", chapter.name);
            }
            Some(ChapterResult::Failed(error)) => println!("✗ {}: {error}", chapter.name),
            None => {}
        }
    }
}
