//! Internal error types for HTTP operations.
//!
//! These errors stay inside `tanko-source` and are mapped to
//! [`SourceError`] at the port boundary.

use tanko_core::SourceError;
use thiserror::Error;

pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Error)]
pub enum HttpError {
    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    RequestFailed { status: u16, url: String },

    #[error("Not found: {url}")]
    NotFound { url: String },

    /// The manifest parsed but does not describe what we need.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl HttpError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl From<HttpError> for SourceError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::RequestFailed { status, .. } => Self::http_status(status, err.to_string()),
            HttpError::NotFound { url } => Self::NotFound(url),
            HttpError::Network(ref e) => match e.status() {
                Some(status) => Self::http_status(status.as_u16(), e.to_string()),
                None => Self::network(e.to_string()),
            },
            HttpError::InvalidResponse { .. } | HttpError::InvalidUrl(_) | HttpError::JsonParse(_) => {
                Self::Parse(err.to_string())
            }
        }
    }
}
