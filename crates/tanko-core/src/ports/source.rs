//! Source port: one remote catalog provider.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::domain::{Chapter, Page, PageStub, SourceId};

/// Errors a source may return.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Transport failure or non-success HTTP status.
    #[error("Network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
    },

    /// The response could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The chapter or page does not exist upstream.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl SourceError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: Some(status),
        }
    }

    /// HTTP status, when the failure carried one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            _ => None,
        }
    }
}

/// A streaming image response.
///
/// The body may be dropped before it ends; the source must tolerate partial
/// consumption.
pub struct ImageStream {
    /// Total size when the server announced it.
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, SourceError>>,
}

impl ImageStream {
    pub fn new(
        content_length: Option<u64>,
        body: BoxStream<'static, Result<Bytes, SourceError>>,
    ) -> Self {
        Self {
            content_length,
            body,
        }
    }

    /// A stream that yields the given chunks in order.
    #[must_use]
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        let len = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            content_length: Some(len),
            body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }
}

impl fmt::Debug for ImageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// One remote catalog provider.
///
/// HTTP timeouts are the implementation's concern; the engine only bounds
/// image retries.
#[async_trait]
pub trait SourcePort: Send + Sync {
    fn id(&self) -> SourceId;

    /// Display name, also the first path segment under the downloads root.
    fn name(&self) -> &str;

    /// Resolve the ordered page list of a chapter.
    async fn page_list(&self, chapter: &Chapter) -> Result<Vec<PageStub>, SourceError>;

    /// Scrape a page's `source_url` for its image URL.
    async fn image_url(&self, page: &Page) -> Result<String, SourceError>;

    /// Open a streaming response for an image URL.
    async fn image_stream(&self, image_url: &str) -> Result<ImageStream, SourceError>;
}
