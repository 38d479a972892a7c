//! Chapter page lists and page images on top of [`DiskBlobCache`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use futures_util::StreamExt;
use tanko_core::{ImageStream, Page, SourceId, TEMP_SUFFIX};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::blob::DiskBlobCache;
use crate::error::{CacheError, CacheResult};

const COPY_CHUNK: usize = 64 * 1024;

/// Cache key of a chapter's page list.
pub fn chapter_key(source_id: SourceId, chapter_url: &str) -> String {
    format!("{source_id}{chapter_url}")
}

/// Persisted part of a [`Page`]. Status and progress are runtime-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PageRecord {
    index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}

impl From<&Page> for PageRecord {
    fn from(page: &Page) -> Self {
        Self {
            index: page.index,
            source_url: page.source_url.clone(),
            image_url: page.image_url.clone(),
        }
    }
}

impl From<PageRecord> for Page {
    fn from(record: PageRecord) -> Self {
        Self::new(record.index, record.source_url, record.image_url)
    }
}

/// Encode a page list the way it is stored in the cache and in a chapter's
/// page index file.
pub fn encode_page_list(pages: &[Page]) -> CacheResult<Vec<u8>> {
    let records: Vec<PageRecord> = pages.iter().map(PageRecord::from).collect();
    Ok(serde_json::to_vec(&records)?)
}

/// Decode a page list produced by [`encode_page_list`].
pub fn decode_page_list(bytes: &[u8]) -> CacheResult<Vec<Page>> {
    let records: Vec<PageRecord> = serde_json::from_slice(bytes)?;
    Ok(records.into_iter().map(Page::from).collect())
}

/// Page-list metadata and image cache for chapter downloads.
///
/// Page lists are keyed by [`chapter_key`]; images by their URL.
#[derive(Debug, Clone)]
pub struct ChapterMetadataCache {
    blobs: DiskBlobCache,
}

impl ChapterMetadataCache {
    pub const fn new(blobs: DiskBlobCache) -> Self {
        Self { blobs }
    }

    /// The underlying blob cache.
    pub const fn blobs(&self) -> &DiskBlobCache {
        &self.blobs
    }

    /// Cached page list for `key`.
    ///
    /// Unreadable or undecodable entries are removed and reported as a miss.
    pub async fn get_page_list(&self, key: &str) -> Option<Vec<Page>> {
        let bytes = match self.blobs.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "tanko.cache", key, error = %e, "Failed to read cached page list");
                return None;
            }
        };

        match decode_page_list(&bytes) {
            Ok(pages) => Some(pages),
            Err(e) => {
                warn!(target: "tanko.cache", key, error = %e, "Corrupt cached page list; discarding");
                if let Err(e) = self.blobs.remove(key).await {
                    warn!(target: "tanko.cache", key, error = %e, "Failed to remove corrupt page list");
                }
                None
            }
        }
    }

    /// Persist the URL scaffolding of `pages` under `key`.
    pub async fn put_page_list(&self, key: &str, pages: &[Page]) -> CacheResult<()> {
        let bytes = encode_page_list(pages)?;
        self.blobs.put(key, &bytes).await?;
        debug!(target: "tanko.cache", key, pages = pages.len(), "Cached page list");
        Ok(())
    }

    pub async fn remove_page_list(&self, key: &str) -> CacheResult<bool> {
        self.blobs.remove(key).await
    }

    pub async fn is_image_cached(&self, image_url: &str) -> bool {
        self.blobs.contains(image_url).await
    }

    /// Where the cached image for `image_url` lives (whether or not it exists).
    pub fn image_path_for(&self, image_url: &str) -> PathBuf {
        self.blobs.entry_path(image_url)
    }

    /// Stream an image response into the cache chunk by chunk.
    ///
    /// `on_progress` receives `(bytes_so_far, content_length)` after every
    /// chunk. A failing stream discards the partial entry.
    pub async fn put_image<F>(
        &self,
        image_url: &str,
        stream: ImageStream,
        mut on_progress: F,
    ) -> CacheResult<PathBuf>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let ImageStream {
            content_length,
            mut body,
        } = stream;
        let mut writer = self.blobs.writer(image_url).await?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_chunk(&chunk).await?;
            on_progress(writer.written(), content_length);
        }

        writer.commit().await
    }

    /// Copy an image already on disk into the cache.
    ///
    /// Best effort: returns `false` without touching the cache when the file
    /// is larger than the whole budget. The file is read in fixed-size chunks.
    pub async fn put_image_file(&self, image_url: &str, src: &Path) -> CacheResult<bool> {
        let len = fs::metadata(src)
            .await
            .map_err(|e| CacheError::io(src, e))?
            .len();
        if len > self.blobs.capacity().await {
            debug!(target: "tanko.cache", url = image_url, size = len, "Image exceeds cache budget; not cached");
            return Ok(false);
        }

        let mut file = fs::File::open(src)
            .await
            .map_err(|e| CacheError::io(src, e))?;
        let mut writer = self.blobs.writer(image_url).await?;
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| CacheError::io(src, e))?;
            if n == 0 {
                break;
            }
            writer.write_chunk(&buf[..n]).await?;
        }
        writer.commit().await?;
        Ok(true)
    }

    pub async fn remove_image(&self, image_url: &str) -> CacheResult<bool> {
        self.blobs.remove(image_url).await
    }

    /// Copy a cached image to `dest` via a temp file and rename.
    ///
    /// Returns `false` when the image is not cached. Refreshes recency.
    pub async fn copy_image_to(&self, image_url: &str, dest: &Path) -> CacheResult<bool> {
        if !self.blobs.touch(image_url).await? {
            return Ok(false);
        }

        let src = self.image_path_for(image_url);
        let tmp = temp_sibling(dest);
        match fs::copy(&src, &tmp).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CacheError::io(&src, e)),
        }
        if let Err(e) = fs::rename(&tmp, dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::io(dest, e));
        }
        Ok(true)
    }

    pub async fn size_on_disk(&self) -> u64 {
        self.blobs.size_on_disk().await
    }

    pub async fn clear(&self) -> CacheResult<()> {
        self.blobs.clear().await
    }
}

/// `dest` with the temp suffix appended to its file name.
pub fn temp_sibling(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push(TEMP_SUFFIX);
    dest.with_file_name(name)
}
