//! Page entity and its state machine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::download::DownloadError;

/// Status of a single page within a chapter download.
///
/// `Ready` and `Error` are terminal for one attempt; `Error → Queued` is
/// the explicit retry edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Waiting for the worker to reach it.
    #[default]
    Queued,
    /// Scraping the page URL for its image URL.
    LoadingPageUrl,
    /// Streaming image bytes to disk.
    DownloadingImage,
    /// Image bytes exist on local disk.
    Ready,
    /// This attempt failed.
    Error,
}

impl PageStatus {
    /// Whether `self → next` is an edge of the page lifecycle.
    ///
    /// `Queued` may skip straight to `DownloadingImage` when the image URL is
    /// already known, and to `Ready` when the image is already on disk.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::LoadingPageUrl | Self::DownloadingImage | Self::Ready)
                | (Self::LoadingPageUrl, Self::DownloadingImage | Self::Ready | Self::Error)
                | (Self::DownloadingImage, Self::Ready | Self::Error)
                | (Self::Error, Self::Queued)
        )
    }

    /// Terminal for the current attempt.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::LoadingPageUrl => "loading_page_url",
            Self::DownloadingImage => "downloading_image",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// A page as returned by a source's page list, before any runtime state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStub {
    pub index: u32,
    /// Page to scrape for the image URL, if the image URL is not yet known.
    pub source_url: Option<String>,
    pub image_url: Option<String>,
}

impl PageStub {
    pub fn with_image(index: u32, image_url: impl Into<String>) -> Self {
        Self {
            index,
            source_url: None,
            image_url: Some(image_url.into()),
        }
    }

    pub fn with_source(index: u32, source_url: impl Into<String>) -> Self {
        Self {
            index,
            source_url: Some(source_url.into()),
            image_url: None,
        }
    }
}

/// One image within a chapter, mutated only by the worker that owns the
/// parent download.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub index: u32,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    /// Set only once the image bytes exist on local disk.
    pub image_path: Option<PathBuf>,
    pub status: PageStatus,
    /// Download progress of the image, 0-100.
    pub progress: u8,
}

impl Page {
    pub const fn new(index: u32, source_url: Option<String>, image_url: Option<String>) -> Self {
        Self {
            index,
            source_url,
            image_url,
            image_path: None,
            status: PageStatus::Queued,
            progress: 0,
        }
    }

    /// Move to `next`, rejecting edges outside the lifecycle.
    ///
    /// Setting the current status again is a no-op.
    pub fn set_status(&mut self, next: PageStatus) -> Result<(), DownloadError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(DownloadError::invalid_transition(
                format!("page {}", self.index),
                self.status.as_str(),
                next.as_str(),
            ));
        }
        self.status = next;
        if next == PageStatus::Ready {
            self.progress = 100;
        }
        Ok(())
    }

    /// Mark the page failed from whatever in-flight state it is in.
    ///
    /// A page that never left `Queued` is routed through `LoadingPageUrl`
    /// so the recorded history stays on lifecycle edges.
    pub fn fail(&mut self) {
        if self.status == PageStatus::Queued {
            self.status = PageStatus::LoadingPageUrl;
        }
        if self.status.can_transition_to(PageStatus::Error) {
            self.status = PageStatus::Error;
        }
    }

    /// Explicit user retry: `Error → Queued`, progress cleared.
    ///
    /// Returns whether the page was reset.
    pub fn reset_for_retry(&mut self) -> bool {
        if self.status != PageStatus::Error {
            return false;
        }
        self.status = PageStatus::Queued;
        self.progress = 0;
        self.image_path = None;
        true
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == PageStatus::Ready
    }
}

impl From<PageStub> for Page {
    fn from(stub: PageStub) -> Self {
        Self::new(stub.index, stub.source_url, stub.image_url)
    }
}
