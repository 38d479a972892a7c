#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

mod blob;
mod chapter;
mod error;
mod journal;
mod writer;

pub use blob::{DiskBlobCache, hash_key};
pub use chapter::{
    ChapterMetadataCache, chapter_key, decode_page_list, encode_page_list, temp_sibling,
};
pub use error::{CacheError, CacheResult};
pub use journal::{JOURNAL_BACKUP_FILE, JOURNAL_FILE, JOURNAL_TMP_FILE};
pub use writer::BlobWriter;

// Silence unused dev-dependency warnings for tests that don't touch them
#[cfg(test)]
use tempfile as _;
