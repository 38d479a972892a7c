//! Streaming writes into the blob cache.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::OwnedMutexGuard;

use crate::blob::DiskBlobCache;
use crate::error::{CacheError, CacheResult};

/// An in-progress write of one cache entry.
///
/// Bytes go to a private temp file. [`commit`](Self::commit) renames it over
/// the entry and records it in the journal; dropping the writer without
/// committing deletes the temp file and leaves the old value untouched.
/// Holds the per-key lock for its whole lifetime.
pub struct BlobWriter {
    cache: DiskBlobCache,
    hash: String,
    tmp_path: PathBuf,
    file: Option<BufWriter<File>>,
    written: u64,
    committed: bool,
    guard: Option<OwnedMutexGuard<()>>,
}

impl BlobWriter {
    pub(crate) fn new(
        cache: DiskBlobCache,
        hash: String,
        tmp_path: PathBuf,
        file: File,
        guard: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            cache,
            hash,
            tmp_path,
            file: Some(BufWriter::new(file)),
            written: 0,
            committed: false,
            guard: Some(guard),
        }
    }

    /// Append a chunk to the pending value.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> CacheResult<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            CacheError::io(&self.tmp_path, std::io::Error::other("writer already closed"))
        })?;
        file.write_all(chunk)
            .await
            .map_err(|e| CacheError::io(&self.tmp_path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Publish the pending value, returning the entry path.
    pub async fn commit(mut self) -> CacheResult<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| CacheError::io(&self.tmp_path, e))?;
            file.get_ref()
                .sync_data()
                .await
                .map_err(|e| CacheError::io(&self.tmp_path, e))?;
        }

        let path = self
            .cache
            .commit_entry(&self.hash, &self.tmp_path, self.written)
            .await?;
        self.committed = true;
        Ok(path)
    }

    /// Discard the pending value.
    pub async fn abort(mut self) -> CacheResult<()> {
        self.file.take();
        match tokio::fs::remove_file(&self.tmp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&self.tmp_path, e)),
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        self.file.take();
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
        self.guard.take();
        self.cache.release_key_lock(&self.hash);
    }
}

impl std::fmt::Debug for BlobWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobWriter")
            .field("tmp_path", &self.tmp_path)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}
