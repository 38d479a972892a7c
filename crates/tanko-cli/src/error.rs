//! CLI-specific error types and exit codes.

use tanko_cache::CacheError;
use tanko_core::{DownloadError, PathError, SettingsError, SourceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Argument or setting out of range.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The source could not be built or reached.
    #[error("Source error: {0}")]
    Source(String),

    #[error("Download error: {0}")]
    Download(String),

    /// The run completed but some chapters ended in error.
    #[error("{failed} of {total} chapters failed")]
    ChaptersFailed { failed: usize, total: usize },

    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error, including failed chapters
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    /// - 130: Interrupted by Ctrl-C
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ChaptersFailed { .. } | Self::Download(_) => 1,
            Self::Arguments(_) => 2,  // EX_USAGE
            Self::Source(_) => 69,    // EX_UNAVAILABLE
            Self::Io(_) => 74,        // EX_IOERR
            Self::Config(_) => 78,    // EX_CONFIG
            Self::Interrupted => 130, // 128 + SIGINT
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Arguments(err.to_string())
    }
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<CacheError> for CliError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::ReservedName(_) => Self::Arguments(err.to_string()),
            other => Self::Io(other.to_string()),
        }
    }
}

impl From<SourceError> for CliError {
    fn from(err: SourceError) -> Self {
        Self::Source(err.to_string())
    }
}

impl From<DownloadError> for CliError {
    fn from(err: DownloadError) -> Self {
        Self::Download(err.user_message())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Exit code for any error that reached `main`.
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
}
