//! Cache error types.

use std::path::{Path, PathBuf};

use tanko_core::{DownloadError, SourceError};
use thiserror::Error;

/// Errors from the disk cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure on a cache file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The name belongs to the cache's own bookkeeping.
    #[error("'{0}' is reserved by the cache and cannot be removed")]
    ReservedName(String),

    /// The journal could not be parsed.
    #[error("Corrupt journal at line {line}: {reason}")]
    Journal { line: usize, reason: String },

    /// Stored metadata could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The byte stream feeding a write failed.
    #[error("Source stream failed: {0}")]
    Source(#[from] SourceError),
}

impl CacheError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn journal(line: usize, reason: impl Into<String>) -> Self {
        Self::Journal {
            line,
            reason: reason.into(),
        }
    }

    /// The underlying I/O error kind, if this is an I/O failure.
    #[must_use]
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for DownloadError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Io { path, source } => DownloadError::io(
                format!("{:?}", source.kind()),
                format!("{}: {source}", path.display()),
            ),
            CacheError::Journal { .. } | CacheError::Serialize(_) => {
                DownloadError::cache_corruption(err.to_string())
            }
            CacheError::Source(source) => match (&source, source.status()) {
                (SourceError::NotFound(_), _) => {
                    DownloadError::network_with_status(source.to_string(), 404)
                }
                (_, Some(status)) => DownloadError::network_with_status(source.to_string(), status),
                (_, None) => DownloadError::network(source.to_string()),
            },
            CacheError::ReservedName(_) => DownloadError::other(err.to_string()),
        }
    }
}
