//! Download error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for download operations.
///
/// The variants follow the failure taxonomy of the engine:
/// `Io` and `Network` fail one job (or one page), `CacheCorruption` is
/// recovered as a cache miss, and `Scheduler` is fatal to the engine.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// I/O error during directory or file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "NotFound", "PermissionDenied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Network/HTTP error while fetching a page list or image.
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Cached metadata could not be decoded.
    #[error("Cache corruption: {message}")]
    CacheCorruption {
        /// What failed to decode.
        message: String,
    },

    /// The concurrency primitive failed internally.
    #[error("Scheduler failure: {message}")]
    Scheduler {
        /// Detailed error message.
        message: String,
    },

    /// The source returned a chapter with no pages.
    #[error("Page list is empty for chapter {chapter}")]
    EmptyPageList {
        /// Chapter display name or id.
        chapter: String,
    },

    /// Chapter not found in the queue.
    #[error("Not in queue: {id}")]
    NotInQueue {
        /// The chapter id that wasn't found.
        id: String,
    },

    /// A status change outside the lifecycle graph was requested.
    #[error("Invalid transition for {subject}: {from} -> {to}")]
    InvalidTransition {
        /// What was being transitioned (e.g. "page 3", "chapter 12").
        subject: String,
        from: String,
        to: String,
    },

    /// The engine was stopped while the job was in flight.
    #[error("Download stopped")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    ///
    /// This captures the error kind name and message for serialization.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn network_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Network {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a cache corruption error.
    pub fn cache_corruption(message: impl Into<String>) -> Self {
        Self::CacheCorruption {
            message: message.into(),
        }
    }

    /// Create a scheduler failure.
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }

    /// Create an empty page list error.
    pub fn empty_page_list(chapter: impl Into<String>) -> Self {
        Self::EmptyPageList {
            chapter: chapter.into(),
        }
    }

    /// Create a not in queue error.
    pub fn not_in_queue(id: impl Into<String>) -> Self {
        Self::NotInQueue { id: id.into() }
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(
        subject: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            subject: subject.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (safe to retry the same request).
    ///
    /// Client errors other than timeouts and rate limiting will not go away
    /// on their own.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Network {
                status_code: Some(code),
                ..
            } => !(*code >= 400 && *code < 500) || *code == 408 || *code == 429,
            Self::Network { .. } | Self::Io { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::Network {
                message,
                status_code: Some(code),
            } => {
                format!("Network error (HTTP {code}): {message}")
            }
            Self::Network { message, .. } => format!("Network error: {message}"),
            Self::CacheCorruption { .. } => {
                "Cached chapter data was unreadable and will be fetched again.".to_string()
            }
            Self::Scheduler { message } => format!("Downloader stopped unexpectedly: {message}"),
            Self::EmptyPageList { chapter } => {
                format!("The source returned no pages for '{chapter}'.")
            }
            Self::NotInQueue { id } => format!("Chapter '{id}' is not in the download queue."),
            Self::InvalidTransition { subject, from, to } => {
                format!("Cannot move {subject} from {from} to {to}.")
            }
            Self::Cancelled => "Download was stopped.".to_string(),
            Self::Other { message } => message.clone(),
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

/// Convenience result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DownloadError::from_io_error(&io_err);

        match err {
            DownloadError::Io { kind, message } => {
                assert_eq!(kind, "NotFound");
                assert!(message.contains("file not found"));
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_error_serialization() {
        let err = DownloadError::network_with_status("bad gateway", 502);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("502"));

        let parsed: DownloadError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(DownloadError::network("timeout").is_recoverable());
        assert!(DownloadError::io("Other", "disk").is_recoverable());
        assert!(DownloadError::network_with_status("unavailable", 503).is_recoverable());
        assert!(DownloadError::network_with_status("slow down", 429).is_recoverable());
        assert!(!DownloadError::network_with_status("gone", 404).is_recoverable());
        assert!(!DownloadError::network_with_status("forbidden", 403).is_recoverable());
        assert!(!DownloadError::Cancelled.is_recoverable());
        assert!(!DownloadError::empty_page_list("ch 1").is_recoverable());
    }

    #[test]
    fn test_user_messages() {
        let err = DownloadError::network_with_status("gone", 410);
        assert!(err.user_message().contains("410"));
        assert!(DownloadError::Cancelled.user_message().contains("stopped"));
    }
}
