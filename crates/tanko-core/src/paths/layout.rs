//! On-disk layout of downloaded chapters.
//!
//! ```text
//! {root}/{source}/{manga}/{chapter}/
//!     000-first.jpg
//!     001-second.jpg
//!     index.json
//! ```

use std::path::{Path, PathBuf};

/// Page-list metadata file written next to the images of a chapter.
pub const PAGE_INDEX_FILE: &str = "index.json";

/// Suffix of in-progress files; never counted as a page.
pub const TEMP_SUFFIX: &str = ".tmp";

const MAX_NAME_BYTES: usize = 240;

/// Make `raw` safe as a single path component on every platform.
///
/// Reserved characters become `_`, leading and trailing dots and spaces are
/// trimmed, and the result is cut to 240 bytes. Never returns an empty name.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let mut end = trimmed.len().min(MAX_NAME_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let cut = trimmed[..end].trim_end();

    if cut.is_empty() {
        "_".to_string()
    } else {
        cut.to_string()
    }
}

/// Directory holding one chapter's images and page index.
#[must_use]
pub fn chapter_dir(root: &Path, source_name: &str, manga_title: &str, chapter_name: &str) -> PathBuf {
    root.join(sanitize_name(source_name))
        .join(sanitize_name(manga_title))
        .join(sanitize_name(chapter_name))
}

/// File name for a page image: `{index:03}-{tail}`.
///
/// `tail` is the last path segment of the image URL without query or
/// fragment. When the URL has no usable tail the name is just `{index:03}`.
#[must_use]
pub fn image_file_name(index: u32, image_url: &str) -> String {
    let without_fragment = image_url.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    let tail = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    // "https://host" has no path segment, only the authority
    let is_authority = without_query.ends_with(&format!("//{tail}"));
    if tail.is_empty() || is_authority {
        return format!("{index:03}");
    }
    format!("{index:03}-{}", sanitize_name(tail))
}
