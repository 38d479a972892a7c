//! Download domain types, events, and errors.
//!
//! This module contains pure data types for the download system. No I/O,
//! networking, or runtime dependencies allowed.
//!
//! # Structure
//!
//! - `status` - `DownloadStatus` and the aggregate status rule
//! - `events` - queue broadcast events and coarse notifier notices
//! - `errors` - error taxonomy for download operations

pub mod errors;
pub mod events;
pub mod status;

// Re-export commonly used types
pub use errors::{DownloadError, DownloadResult};
pub use events::{ChapterNotice, DownloadEvent};
pub use status::{DownloadStatus, aggregate_status};
