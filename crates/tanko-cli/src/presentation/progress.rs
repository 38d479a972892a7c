//! CLI progress rendering for chapter downloads.
//!
//! Presentation only: it consumes [`DownloadEvent`]s and never touches the
//! engine. A terminal gets one indicatif bar per chapter; anything else gets
//! one plain line per milestone.

use std::collections::HashMap;
use std::io::{self, IsTerminal};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tanko_core::{ChapterId, DownloadEvent, DownloadStatus, PageStatus};

const MAX_LABEL: usize = 40;

/// Progress display that picks terminal or plain output.
pub struct ChapterProgress {
    labels: HashMap<ChapterId, String>,
    inner: ProgressRender,
}

enum ProgressRender {
    Fancy(FancyProgress),
    Plain,
}

impl ChapterProgress {
    /// `labels` maps each chapter to the name shown next to its progress.
    pub fn new(labels: HashMap<ChapterId, String>) -> Self {
        let inner = if io::stdout().is_terminal() {
            ProgressRender::Fancy(FancyProgress::new())
        } else {
            ProgressRender::Plain
        };
        Self { labels, inner }
    }

    fn label(&self, chapter_id: ChapterId) -> String {
        self.labels
            .get(&chapter_id)
            .map_or_else(|| format!("Chapter {chapter_id}"), |name| format_label(name))
    }

    pub fn apply(&mut self, event: &DownloadEvent) {
        let Some(chapter_id) = event.chapter_id() else {
            return;
        };
        let label = self.label(chapter_id);
        match &mut self.inner {
            ProgressRender::Fancy(fancy) => fancy.apply(chapter_id, &label, event),
            ProgressRender::Plain => {
                if let Some(line) = describe(&label, event) {
                    println!("{line}");
                }
            }
        }
    }

    /// Stop drawing; finished bars stay on screen.
    pub fn finish(&mut self) {
        if let ProgressRender::Fancy(fancy) = &mut self.inner {
            fancy.finish();
        }
    }
}

struct FancyProgress {
    multi: MultiProgress,
    bars: HashMap<ChapterId, ProgressBar>,
}

impl FancyProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stdout()),
            bars: HashMap::new(),
        }
    }

    fn bar(&mut self, chapter_id: ChapterId, label: &str) -> &ProgressBar {
        self.bars.entry(chapter_id).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(0));
            bar.set_style(bar_style());
            bar.set_prefix(label.to_string());
            bar
        })
    }

    fn apply(&mut self, chapter_id: ChapterId, label: &str, event: &DownloadEvent) {
        let bar = self.bar(chapter_id, label);
        match event {
            DownloadEvent::Queued { .. } => bar.set_message("queued"),
            DownloadEvent::StatusChanged { status, error, .. } => match status {
                DownloadStatus::Downloading => bar.set_message("downloading"),
                DownloadStatus::Downloaded => bar.finish_with_message("done"),
                DownloadStatus::Error => bar.abandon_with_message(format!(
                    "failed: {}",
                    error.as_deref().unwrap_or("unknown error")
                )),
                DownloadStatus::Queued | DownloadStatus::NotDownloaded => {
                    bar.set_message(status.as_str());
                }
            },
            DownloadEvent::Progress {
                downloaded, total, ..
            } => {
                bar.set_length(u64::from(*total));
                bar.set_position(u64::from(*downloaded));
            }
            DownloadEvent::PageChanged {
                index,
                status: PageStatus::DownloadingImage,
                progress,
                ..
            } => bar.set_message(format!("page {} {progress}%", index + 1)),
            DownloadEvent::Removed { .. } if !bar.is_finished() => {
                bar.finish_and_clear();
            }
            _ => {}
        }
    }

    fn finish(&mut self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:40} {bar:28.cyan/blue} {pos:>3}/{len:3} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Plain-text line for milestones worth printing without a terminal.
pub fn describe(label: &str, event: &DownloadEvent) -> Option<String> {
    match event {
        DownloadEvent::Queued { .. } => Some(format!("[{label}] queued")),
        DownloadEvent::StatusChanged {
            status: DownloadStatus::Error,
            error,
            ..
        } => Some(format!(
            "[{label}] failed: {}",
            error.as_deref().unwrap_or("unknown error")
        )),
        DownloadEvent::StatusChanged { status, .. } => Some(format!("[{label}] {status}")),
        DownloadEvent::Progress {
            downloaded,
            total,
            percent,
            ..
        } => Some(format!("[{label}] {downloaded}/{total} pages ({percent}%)")),
        _ => None,
    }
}

/// Truncate a display name to the label column width.
pub fn format_label(raw: &str) -> String {
    if raw.chars().count() <= MAX_LABEL {
        return raw.to_string();
    }
    let mut buf: String = raw.chars().take(MAX_LABEL - 1).collect();
    buf.push('…');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_label_short() {
        assert_eq!(format_label("Chapter 12"), "Chapter 12");
    }

    #[test]
    fn test_format_label_truncates_long() {
        let result = format_label(&"a".repeat(50));
        assert_eq!(result.chars().count(), MAX_LABEL);
        assert!(result.ends_with('…'));
    }

    #[test]
    fn plain_lines_for_milestones() {
        let id = ChapterId(4);
        assert_eq!(
            describe("Ch 4", &DownloadEvent::progress(id, 3, 12)).as_deref(),
            Some("[Ch 4] 3/12 pages (25%)")
        );
        assert_eq!(
            describe("Ch 4", &DownloadEvent::status(id, DownloadStatus::Downloaded)).as_deref(),
            Some("[Ch 4] downloaded")
        );
        assert_eq!(
            describe("Ch 4", &DownloadEvent::failed(id, "1 of 3 pages failed")).as_deref(),
            Some("[Ch 4] failed: 1 of 3 pages failed")
        );
        assert!(describe("Ch 4", &DownloadEvent::QueueDrained).is_none());
    }

    #[test]
    fn unknown_chapter_gets_a_fallback_label() {
        let progress = ChapterProgress {
            labels: HashMap::from([(ChapterId(1), "One".to_string())]),
            inner: ProgressRender::Plain,
        };
        assert_eq!(progress.label(ChapterId(1)), "One");
        assert_eq!(progress.label(ChapterId(9)), "Chapter 9");
    }
}
