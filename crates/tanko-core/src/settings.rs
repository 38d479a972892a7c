//! Settings domain types and validation.
//!
//! These are pure domain types with no infrastructure dependencies. The CLI
//! builds them from flags and environment variables; the engine reads the
//! effective values.

use serde::{Deserialize, Serialize};

/// Default number of concurrent chapter downloads.
pub const DEFAULT_DOWNLOAD_WORKERS: u32 = 2;

/// Upper bound on the worker count a user may request.
pub const MAX_DOWNLOAD_WORKERS: u32 = 16;

/// Default byte budget of the chapter disk cache (100 MiB).
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Default attempts per image before the page is marked failed.
pub const DEFAULT_IMAGE_RETRIES: u32 = 3;

/// Application settings structure.
///
/// All fields are optional to support partial updates and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Root directory for downloaded chapters.
    pub downloads_dir: Option<String>,

    /// Directory of the chapter disk cache.
    pub cache_dir: Option<String>,

    /// Byte budget of the chapter disk cache.
    pub cache_size_bytes: Option<u64>,

    /// Desired concurrent chapter downloads (0 pauses, max 16).
    pub download_workers: Option<u32>,

    /// Attempts per image download (1-10).
    pub image_retries: Option<u32>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            downloads_dir: None,
            cache_dir: None,
            cache_size_bytes: Some(DEFAULT_CACHE_SIZE_BYTES),
            download_workers: Some(DEFAULT_DOWNLOAD_WORKERS),
            image_retries: Some(DEFAULT_IMAGE_RETRIES),
        }
    }

    #[must_use]
    pub const fn effective_download_workers(&self) -> u32 {
        match self.download_workers {
            Some(n) => n,
            None => DEFAULT_DOWNLOAD_WORKERS,
        }
    }

    #[must_use]
    pub const fn effective_cache_size(&self) -> u64 {
        match self.cache_size_bytes {
            Some(bytes) => bytes,
            None => DEFAULT_CACHE_SIZE_BYTES,
        }
    }

    #[must_use]
    pub const fn effective_image_retries(&self) -> u32 {
        match self.image_retries {
            Some(n) => n,
            None => DEFAULT_IMAGE_RETRIES,
        }
    }

    /// Merge an update into this one, only touching fields that are Some.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(ref dir) = other.downloads_dir {
            self.downloads_dir.clone_from(dir);
        }
        if let Some(ref dir) = other.cache_dir {
            self.cache_dir.clone_from(dir);
        }
        if let Some(ref size) = other.cache_size_bytes {
            self.cache_size_bytes = *size;
        }
        if let Some(ref workers) = other.download_workers {
            self.download_workers = *workers;
        }
        if let Some(ref retries) = other.image_retries {
            self.image_retries = *retries;
        }
    }
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = reset field to its default
/// - `Some(Some(value))` = set field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub downloads_dir: Option<Option<String>>,
    pub cache_dir: Option<Option<String>>,
    pub cache_size_bytes: Option<Option<u64>>,
    pub download_workers: Option<Option<u32>>,
    pub image_retries: Option<Option<u32>>,
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Download workers must be between 0 and {MAX_DOWNLOAD_WORKERS}, got {0}")]
    InvalidWorkerCount(u32),

    #[error("Cache size must be at least 1 MiB, got {0} bytes")]
    InvalidCacheSize(u64),

    #[error("Image retries must be between 1 and 10, got {0}")]
    InvalidRetryCount(u32),

    #[error("{0} cannot be empty")]
    EmptyPath(&'static str),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if let Some(workers) = settings.download_workers {
        if workers > MAX_DOWNLOAD_WORKERS {
            return Err(SettingsError::InvalidWorkerCount(workers));
        }
    }

    if let Some(size) = settings.cache_size_bytes {
        if size < 1024 * 1024 {
            return Err(SettingsError::InvalidCacheSize(size));
        }
    }

    if let Some(retries) = settings.image_retries {
        if !(1..=10).contains(&retries) {
            return Err(SettingsError::InvalidRetryCount(retries));
        }
    }

    if settings
        .downloads_dir
        .as_ref()
        .is_some_and(|p| p.trim().is_empty())
    {
        return Err(SettingsError::EmptyPath("Downloads directory"));
    }

    if settings
        .cache_dir
        .as_ref()
        .is_some_and(|p| p.trim().is_empty())
    {
        return Err(SettingsError::EmptyPath("Cache directory"));
    }

    Ok(())
}
