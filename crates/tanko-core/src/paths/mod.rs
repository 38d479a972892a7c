//! Path utilities for tanko data directories and the persisted layout.
//!
//! This module provides the canonical path resolution for all tanko components:
//! - Downloads root and per-chapter directories
//! - Chapter disk cache directory
//! - Image and page-index file names
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O - adapters handle user prompts separately

mod error;
mod layout;
mod locations;

pub use error::PathError;
pub use layout::{PAGE_INDEX_FILE, TEMP_SUFFIX, chapter_dir, image_file_name, sanitize_name};
pub use locations::{
    default_cache_dir, default_downloads_dir, normalize_user_path, resolve_cache_dir,
    resolve_downloads_dir,
};
