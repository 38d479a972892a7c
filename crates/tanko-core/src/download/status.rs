//! Chapter download status and the aggregate status rule.

use serde::{Deserialize, Serialize};

use crate::domain::{Page, PageStatus};

/// Status of a chapter download.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Known to the catalog, not in any queue.
    #[default]
    NotDownloaded,
    /// Waiting in the queue for a worker.
    Queued,
    /// A worker is processing the chapter.
    Downloading,
    /// Every page is on disk.
    Downloaded,
    /// At least one page (or the page list) failed.
    Error,
}

impl DownloadStatus {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotDownloaded => "not_downloaded",
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Error => "error",
        }
    }

    /// Whether `self → next` is an edge of the chapter lifecycle.
    ///
    /// `Error → Queued` and `Downloaded → Queued` are the manual retry and
    /// re-download edges. `NotDownloaded → Downloaded` covers chapters found
    /// complete on disk at enqueue time.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotDownloaded, Self::Queued | Self::Downloaded)
                | (Self::Queued, Self::Downloading | Self::Error)
                | (Self::Downloading, Self::Downloaded | Self::Error)
                | (Self::Error | Self::Downloaded, Self::Queued)
        )
    }

    /// No worker will touch a chapter in this state without a manual action.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Downloaded | Self::Error)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a chapter after all its pages ran.
///
/// `Downloaded` iff every page is `Ready` and the directory holds exactly one
/// file per page plus the page index. Anything else is `Error`. The file
/// count check is structural only; truncated images still count as present.
#[must_use]
pub fn aggregate_status(pages: &[Page], files_on_disk: usize) -> DownloadStatus {
    let all_ready = !pages.is_empty() && pages.iter().all(|p| p.status == PageStatus::Ready);
    if all_ready && files_on_disk == pages.len() + 1 {
        DownloadStatus::Downloaded
    } else {
        DownloadStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(statuses: &[PageStatus]) -> Vec<Page> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut page = Page::new(u32::try_from(i).unwrap(), None, Some(format!("u/{i}")));
                page.status = *status;
                page
            })
            .collect()
    }

    #[test]
    fn all_ready_and_count_matches_is_downloaded() {
        let pages = pages(&[PageStatus::Ready; 3]);
        assert_eq!(aggregate_status(&pages, 4), DownloadStatus::Downloaded);
    }

    #[test]
    fn missing_file_is_error() {
        let pages = pages(&[PageStatus::Ready; 3]);
        assert_eq!(aggregate_status(&pages, 3), DownloadStatus::Error);
    }

    #[test]
    fn any_error_page_is_error() {
        let pages = pages(&[PageStatus::Ready, PageStatus::Error, PageStatus::Ready]);
        assert_eq!(aggregate_status(&pages, 4), DownloadStatus::Error);
    }

    #[test]
    fn empty_page_list_is_error() {
        assert_eq!(aggregate_status(&[], 1), DownloadStatus::Error);
    }

    #[test]
    fn retry_edges_exist() {
        assert!(DownloadStatus::Error.can_transition_to(DownloadStatus::Queued));
        assert!(DownloadStatus::Downloaded.can_transition_to(DownloadStatus::Queued));
        assert!(!DownloadStatus::Downloaded.can_transition_to(DownloadStatus::Downloading));
        assert!(!DownloadStatus::NotDownloaded.can_transition_to(DownloadStatus::Downloading));
    }
}
