#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod download;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{Chapter, ChapterId, Manga, MangaId, Page, PageStatus, PageStub, SourceId};
pub use download::{
    ChapterNotice, DownloadError, DownloadEvent, DownloadResult, DownloadStatus, aggregate_status,
};
pub use ports::{
    ImageStream, NoopNotifier, NotifierPort, PreferencesPort, SourceError, SourcePort,
    WatchPreferences,
};
pub use settings::{
    DEFAULT_CACHE_SIZE_BYTES, DEFAULT_DOWNLOAD_WORKERS, DEFAULT_IMAGE_RETRIES,
    MAX_DOWNLOAD_WORKERS, Settings, SettingsError, SettingsUpdate, validate_settings,
};

// Re-export path utilities
pub use paths::{
    PAGE_INDEX_FILE, PathError, TEMP_SUFFIX, chapter_dir, default_cache_dir,
    default_downloads_dir, image_file_name, normalize_user_path, resolve_cache_dir,
    resolve_downloads_dir, sanitize_name,
};
