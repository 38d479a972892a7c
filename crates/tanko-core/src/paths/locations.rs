//! Default and user-supplied directory locations.

use std::env;
use std::path::PathBuf;

use super::error::PathError;

const APP_DIR: &str = "tanko";

/// `{data_dir}/tanko/downloads`.
pub fn default_downloads_dir() -> Result<PathBuf, PathError> {
    let data = dirs::data_dir().ok_or(PathError::NoSystemDir("data"))?;
    Ok(data.join(APP_DIR).join("downloads"))
}

/// `{cache_dir}/tanko/chapter_disk_cache`.
pub fn default_cache_dir() -> Result<PathBuf, PathError> {
    let cache = dirs::cache_dir().ok_or(PathError::NoSystemDir("cache"))?;
    Ok(cache.join(APP_DIR).join("chapter_disk_cache"))
}

/// Explicit path (with `~` expansion) or the default downloads root.
pub fn resolve_downloads_dir(explicit: Option<&str>) -> Result<PathBuf, PathError> {
    match explicit {
        Some(raw) => normalize_user_path(raw),
        None => default_downloads_dir(),
    }
}

/// Explicit path (with `~` expansion) or the default cache directory.
pub fn resolve_cache_dir(explicit: Option<&str>) -> Result<PathBuf, PathError> {
    match explicit {
        Some(raw) => normalize_user_path(raw),
        None => default_cache_dir(),
    }
}

/// Expand a leading `~` and make the path absolute.
pub fn normalize_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let expanded = if trimmed.starts_with("~/") || trimmed == "~" {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
        if trimmed == "~" {
            home
        } else {
            home.join(trimmed.trim_start_matches("~/"))
        }
    } else {
        PathBuf::from(trimmed)
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(expanded))
            .map_err(|e| PathError::CurrentDirError(e.to_string()))
    }
}
