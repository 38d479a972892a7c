//! Chapter directory planning and on-disk inspection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tanko_cache::{decode_page_list, encode_page_list, temp_sibling};
use tanko_core::{
    Chapter, DownloadError, ImageStream, Manga, PAGE_INDEX_FILE, Page, TEMP_SUFFIX, chapter_dir,
    image_file_name,
};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::source_error;

/// A planned chapter directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDestination {
    pub dir: PathBuf,
}

impl ChapterDestination {
    /// `<root>/<source>/<manga>/<chapter>`, each segment sanitized.
    pub fn plan(root: &Path, source_name: &str, manga: &Manga, chapter: &Chapter) -> Self {
        Self {
            dir: chapter_dir(root, source_name, &manga.title, &chapter.name),
        }
    }

    pub const fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub async fn ensure_dir(&self) -> Result<(), DownloadError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::io("create_dir", format!("{}: {e}", self.dir.display())))
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.dir)
            .await
            .is_ok_and(|meta| meta.is_dir())
    }

    /// Delete the directory and everything in it. A missing directory is fine.
    pub async fn remove_dir(&self) -> Result<(), DownloadError> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::io(
                format!("{:?}", e.kind()),
                format!("{}: {e}", self.dir.display()),
            )),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(PAGE_INDEX_FILE)
    }

    /// Final path of a page image.
    pub fn image_path(&self, index: u32, image_url: &str) -> PathBuf {
        self.dir.join(image_file_name(index, image_url))
    }

    /// Regular files in the directory, excluding in-progress temp files.
    ///
    /// Counts `index.json` too. A missing directory counts as empty.
    pub async fn count_files(&self) -> Result<usize, DownloadError> {
        let mut count = 0;
        for (name, _) in self.list_files().await? {
            if !name.ends_with(TEMP_SUFFIX) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Page images already present, keyed by page index.
    ///
    /// A file belongs to page `i` when its name is `{i:03}` or starts with
    /// `{i:03}-`.
    pub async fn existing_images(&self) -> Result<HashMap<u32, PathBuf>, DownloadError> {
        let mut found = HashMap::new();
        for (name, path) in self.list_files().await? {
            if name.ends_with(TEMP_SUFFIX) || name == PAGE_INDEX_FILE {
                continue;
            }
            if let Some(index) = page_index_of(&name) {
                found.entry(index).or_insert(path);
            }
        }
        Ok(found)
    }

    /// Stream an image response to `target` through a temp sibling.
    ///
    /// `on_progress` receives `(bytes_so_far, content_length)` after every
    /// chunk. A failed stream or write leaves no file behind.
    pub async fn write_image<F>(
        &self,
        target: &Path,
        stream: ImageStream,
        on_progress: F,
    ) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let tmp = temp_sibling(target);
        let written = match stream_to_file(&tmp, stream, on_progress).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(written)
    }

    /// Write the page index atomically (temp file + rename).
    pub async fn write_index(&self, pages: &[Page]) -> Result<(), DownloadError> {
        let bytes =
            encode_page_list(pages).map_err(|e| DownloadError::other(format!("encode page index: {e}")))?;
        let path = self.index_path();
        let tmp = temp_sibling(&path);
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Page list recorded by a previous run, if any.
    ///
    /// An unreadable index is treated as absent.
    pub async fn read_index(&self) -> Option<Vec<Page>> {
        let bytes = fs::read(self.index_path()).await.ok()?;
        decode_page_list(&bytes).ok()
    }

    async fn list_files(&self) -> Result<Vec<(String, PathBuf)>, DownloadError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
            }
        }
        Ok(files)
    }
}

async fn stream_to_file<F>(path: &Path, stream: ImageStream, mut on_progress: F) -> Result<u64, DownloadError>
where
    F: FnMut(u64, Option<u64>) + Send,
{
    let ImageStream {
        content_length,
        mut body,
    } = stream;
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(source_error)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        on_progress(written, content_length);
    }
    file.flush().await?;
    Ok(written)
}

fn page_index_of(name: &str) -> Option<u32> {
    let digits_end = name.find(|c: char| !c.is_ascii_digit()).unwrap_or(name.len());
    let (digits, rest) = name.split_at(digits_end);
    if digits.len() < 3 || !(rest.is_empty() || rest.starts_with('-')) {
        return None;
    }
    digits.parse().ok()
}
