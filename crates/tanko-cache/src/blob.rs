//! Journaled disk LRU cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tanko_core::TEMP_SUFFIX;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::journal::{self, COMPACT_THRESHOLD, JOURNAL_FILE, JournalOp, Replay};
use crate::writer::BlobWriter;

/// Hash a cache key into its entry file name.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Byte-budgeted LRU cache stored as one file per entry plus a journal.
///
/// Cloning is cheap; clones share the same index. Create one per cache
/// directory per process.
#[derive(Clone)]
pub struct DiskBlobCache {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    state: Mutex<State>,
    key_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    next_tmp: AtomicU64,
}

struct State {
    /// Least recently used first.
    index: IndexMap<String, u64>,
    size: u64,
    capacity: u64,
    journal: fs::File,
    /// Record lines currently in the journal.
    journal_lines: usize,
}

impl std::fmt::Debug for DiskBlobCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBlobCache")
            .field("dir", &self.inner.dir)
            .finish_non_exhaustive()
    }
}

impl DiskBlobCache {
    /// Open (or create) the cache in `dir` with a byte budget of `capacity`.
    ///
    /// Replays the journal, drops entries whose files are gone, deletes
    /// uncommitted temp files and orphaned entry files, then rewrites the
    /// journal compactly. A corrupt journal empties the cache.
    pub async fn open(dir: impl Into<PathBuf>, capacity: u64) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        journal::restore_backup(&dir).await?;

        let journal_path = dir.join(JOURNAL_FILE);
        let replayed = match fs::read_to_string(&journal_path).await {
            Ok(text) => journal::replay(&text).unwrap_or_else(|e| {
                warn!(
                    target: "tanko.cache",
                    dir = %dir.display(),
                    error = %e,
                    "Discarding corrupt cache journal"
                );
                Replay::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Replay::default(),
            Err(e) => return Err(CacheError::io(&journal_path, e)),
        };

        let index = reconcile(&dir, replayed.entries).await?;
        journal::rewrite(&dir, &journal::compacted(&index)).await?;
        let journal = open_append(&journal_path).await?;
        let size = index.values().sum();
        let journal_lines = index.len();

        let cache = Self {
            inner: Arc::new(Inner {
                dir,
                state: Mutex::new(State {
                    index,
                    size,
                    capacity,
                    journal,
                    journal_lines,
                }),
                key_locks: std::sync::Mutex::new(HashMap::new()),
                next_tmp: AtomicU64::new(0),
            }),
        };

        {
            let mut state = cache.inner.state.lock().await;
            cache.trim_to_capacity(&mut state).await?;
            debug!(
                target: "tanko.cache",
                dir = %cache.inner.dir.display(),
                entries = state.index.len(),
                size = state.size,
                capacity,
                "Opened disk cache"
            );
        }
        Ok(cache)
    }

    /// Read an entry, marking it most recently used.
    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let hash = hash_key(key);
        if !self.touch_hash(&hash).await? {
            return Ok(None);
        }

        let path = self.inner.dir.join(&hash);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.forget_missing(&hash).await?;
                Ok(None)
            }
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Mark an entry most recently used without reading it.
    ///
    /// Returns whether the entry exists.
    pub async fn touch(&self, key: &str) -> CacheResult<bool> {
        self.touch_hash(&hash_key(key)).await
    }

    /// Whether an entry exists. Does not affect recency.
    pub async fn contains(&self, key: &str) -> bool {
        let hash = hash_key(key);
        self.inner.state.lock().await.index.contains_key(&hash)
    }

    /// Path the entry for `key` lives at once committed.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.inner.dir.join(hash_key(key))
    }

    /// Store `bytes` under `key`, replacing any previous value atomically.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> CacheResult<PathBuf> {
        let mut writer = self.writer(key).await?;
        writer.write_chunk(bytes).await?;
        writer.commit().await
    }

    /// Open a streaming writer for `key`.
    ///
    /// Waits until no other writer holds the same key. The previous value
    /// stays readable until [`BlobWriter::commit`].
    pub async fn writer(&self, key: &str) -> CacheResult<BlobWriter> {
        let hash = hash_key(key);
        let guard = self.key_lock(&hash).lock_owned().await;

        let n = self.inner.next_tmp.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self.inner.dir.join(format!("{hash}.{n}{TEMP_SUFFIX}"));
        let file = match fs::File::create(&tmp_path).await {
            Ok(file) => file,
            Err(e) => {
                drop(guard);
                self.release_key_lock(&hash);
                return Err(CacheError::io(&tmp_path, e));
            }
        };
        Ok(BlobWriter::new(self.clone(), hash, tmp_path, file, guard))
    }

    /// Remove the entry for `key`. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> CacheResult<bool> {
        self.remove_hash(&hash_key(key)).await
    }

    /// Remove an entry by its on-disk file name.
    ///
    /// Journal names are rejected with [`CacheError::ReservedName`]; names
    /// that are not entry files are ignored.
    pub async fn remove_file(&self, file_name: &str) -> CacheResult<bool> {
        if journal::is_reserved(file_name) {
            return Err(CacheError::ReservedName(file_name.to_string()));
        }
        if !journal::is_entry_name(file_name) {
            return Ok(false);
        }
        self.remove_hash(file_name).await
    }

    /// Sum of resident entry sizes in bytes.
    pub async fn size_on_disk(&self) -> u64 {
        self.inner.state.lock().await.size
    }

    pub async fn capacity(&self) -> u64 {
        self.inner.state.lock().await.capacity
    }

    /// Change the byte budget, evicting least recently used entries before
    /// returning. Returns how many entries were evicted.
    pub async fn set_capacity(&self, capacity: u64) -> CacheResult<usize> {
        let mut state = self.inner.state.lock().await;
        state.capacity = capacity;
        let evicted = self.trim_to_capacity(&mut state).await?;
        self.maybe_compact(&mut state).await?;
        Ok(evicted)
    }

    pub fn directory(&self) -> &Path {
        &self.inner.dir
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys in least- to most-recently-used order, as entry file names.
    pub async fn entry_names(&self) -> Vec<String> {
        self.inner.state.lock().await.index.keys().cloned().collect()
    }

    /// Delete every entry and start a fresh journal.
    pub async fn clear(&self) -> CacheResult<()> {
        let mut state = self.inner.state.lock().await;
        let hashes: Vec<String> = state.index.drain(..).map(|(hash, _)| hash).collect();
        for hash in &hashes {
            self.delete_entry_file(hash).await?;
        }
        state.size = 0;
        self.rewrite_journal(&mut state).await?;
        debug!(target: "tanko.cache", removed = hashes.len(), "Cleared disk cache");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals shared with BlobWriter
    // ------------------------------------------------------------------

    /// Move a finished temp file into place and record it.
    pub(crate) async fn commit_entry(
        &self,
        hash: &str,
        tmp_path: &Path,
        size: u64,
    ) -> CacheResult<PathBuf> {
        let dest = self.inner.dir.join(hash);
        let mut state = self.inner.state.lock().await;

        // Renaming under the index lock keeps eviction of the old value from
        // deleting the new file.
        fs::rename(tmp_path, &dest)
            .await
            .map_err(|e| CacheError::io(tmp_path, e))?;

        if let Some(old) = state.index.shift_remove(hash) {
            state.size -= old;
        }
        state.index.insert(hash.to_string(), size);
        state.size += size;
        self.append(
            &mut state,
            &JournalOp::Clean {
                hash: hash.to_string(),
                size,
            },
        )
        .await?;

        self.trim_to_capacity(&mut state).await?;
        self.maybe_compact(&mut state).await?;
        Ok(dest)
    }

    pub(crate) fn release_key_lock(&self, hash: &str) {
        let mut locks = self
            .inner
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks.get(hash).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(hash);
        }
    }

    fn key_lock(&self, hash: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .inner
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(hash.to_string()).or_default())
    }

    async fn touch_hash(&self, hash: &str) -> CacheResult<bool> {
        let mut state = self.inner.state.lock().await;
        let Some(size) = state.index.shift_remove(hash) else {
            return Ok(false);
        };
        state.index.insert(hash.to_string(), size);
        self.append(
            &mut state,
            &JournalOp::Read {
                hash: hash.to_string(),
            },
        )
        .await?;
        self.maybe_compact(&mut state).await?;
        Ok(true)
    }

    /// Drop an index entry whose file vanished, unless a writer has since
    /// put a new file in place.
    async fn forget_missing(&self, hash: &str) -> CacheResult<()> {
        let mut state = self.inner.state.lock().await;
        let path = self.inner.dir.join(hash);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        if let Some(size) = state.index.shift_remove(hash) {
            state.size -= size;
            warn!(target: "tanko.cache", entry = hash, "Cache entry file missing; dropped");
            self.append(
                &mut state,
                &JournalOp::Remove {
                    hash: hash.to_string(),
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn remove_hash(&self, hash: &str) -> CacheResult<bool> {
        let mut state = self.inner.state.lock().await;
        let Some(size) = state.index.shift_remove(hash) else {
            return Ok(false);
        };
        state.size -= size;
        self.delete_entry_file(hash).await?;
        self.append(
            &mut state,
            &JournalOp::Remove {
                hash: hash.to_string(),
            },
        )
        .await?;
        self.maybe_compact(&mut state).await?;
        Ok(true)
    }

    /// Evict from the least recently used end until within budget.
    async fn trim_to_capacity(&self, state: &mut State) -> CacheResult<usize> {
        let mut evicted = 0;
        while state.size > state.capacity {
            let Some((hash, size)) = state.index.shift_remove_index(0) else {
                break;
            };
            state.size -= size;
            self.delete_entry_file(&hash).await?;
            self.append(state, &JournalOp::Remove { hash }).await?;
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                target: "tanko.cache",
                evicted,
                size = state.size,
                capacity = state.capacity,
                "Evicted least recently used entries"
            );
        }
        Ok(evicted)
    }

    async fn append(&self, state: &mut State, op: &JournalOp) -> CacheResult<()> {
        let line = op.to_line();
        let journal_path = self.inner.dir.join(JOURNAL_FILE);
        state
            .journal
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CacheError::io(&journal_path, e))?;
        state
            .journal
            .flush()
            .await
            .map_err(|e| CacheError::io(&journal_path, e))?;
        state.journal_lines += 1;
        Ok(())
    }

    async fn maybe_compact(&self, state: &mut State) -> CacheResult<()> {
        let redundant = state.journal_lines.saturating_sub(state.index.len());
        if redundant >= COMPACT_THRESHOLD && redundant >= state.index.len() {
            debug!(target: "tanko.cache", redundant, "Compacting cache journal");
            self.rewrite_journal(state).await?;
        }
        Ok(())
    }

    async fn rewrite_journal(&self, state: &mut State) -> CacheResult<()> {
        journal::rewrite(&self.inner.dir, &journal::compacted(&state.index)).await?;
        state.journal = open_append(&self.inner.dir.join(JOURNAL_FILE)).await?;
        state.journal_lines = state.index.len();
        Ok(())
    }

    async fn delete_entry_file(&self, hash: &str) -> CacheResult<()> {
        let path = self.inner.dir.join(hash);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }
}

async fn open_append(path: &Path) -> CacheResult<fs::File> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| CacheError::io(path, e))
}

/// Match the replayed index against the directory contents.
///
/// Entries without a file are dropped and sizes are taken from the files.
/// Temp files and entry files the journal does not know are deleted.
async fn reconcile(dir: &Path, mut entries: IndexMap<String, u64>) -> CacheResult<IndexMap<String, u64>> {
    let mut on_disk: HashMap<String, u64> = HashMap::new();
    let mut read_dir = fs::read_dir(dir).await.map_err(|e| CacheError::io(dir, e))?;

    while let Some(dirent) = read_dir
        .next_entry()
        .await
        .map_err(|e| CacheError::io(dir, e))?
    {
        let Ok(name) = dirent.file_name().into_string() else {
            continue;
        };
        if journal::is_reserved(&name) {
            continue;
        }
        let path = dirent.path();
        let stale = name.ends_with(TEMP_SUFFIX)
            || (journal::is_entry_name(&name) && !entries.contains_key(&name));
        if stale {
            debug!(target: "tanko.cache", file = %name, "Removing stale cache file");
            if let Err(e) = fs::remove_file(&path).await {
                warn!(target: "tanko.cache", file = %name, error = %e, "Failed to remove stale cache file");
            }
            continue;
        }
        if journal::is_entry_name(&name) {
            let len = dirent
                .metadata()
                .await
                .map_err(|e| CacheError::io(&path, e))?
                .len();
            on_disk.insert(name, len);
        }
    }

    entries.retain(|hash, size| match on_disk.get(hash) {
        Some(len) => {
            *size = *len;
            true
        }
        None => false,
    });
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[tokio::test]
    async fn put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskBlobCache::open(dir.path(), MIB).await.unwrap();

        cache.put("https://example.com/a b?c", b"hello").await.unwrap();
        assert_eq!(
            cache.get("https://example.com/a b?c").await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );
        assert_eq!(cache.size_on_disk().await, 5);
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entry_files_use_hashed_names() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskBlobCache::open(dir.path(), MIB).await.unwrap();
        let path = cache.put("some/key", b"x").await.unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(journal::is_entry_name(name));
        assert_eq!(path, cache.entry_path("some/key"));
    }

    #[tokio::test]
    async fn put_replaces_and_adjusts_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskBlobCache::open(dir.path(), MIB).await.unwrap();

        cache.put("k", b"first value").await.unwrap();
        cache.put("k", b"v2").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some(&b"v2"[..]));
        assert_eq!(cache.size_on_disk().await, 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskBlobCache::open(dir.path(), MIB).await.unwrap();
        cache.put("k", b"abc").await.unwrap();

        assert!(cache.remove("k").await.unwrap());
        assert!(!cache.remove("k").await.unwrap());
        assert!(!cache.entry_path("k").exists());
        assert_eq!(cache.size_on_disk().await, 0);
    }

    #[tokio::test]
    async fn remove_file_rejects_journal_names() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskBlobCache::open(dir.path(), MIB).await.unwrap();

        for name in ["journal", "journal.tmp", "journal.bkp"] {
            assert!(matches!(
                cache.remove_file(name).await,
                Err(CacheError::ReservedName(_))
            ));
        }
        assert!(dir.path().join("journal").exists());

        let path = cache.put("k", b"abc").await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(cache.remove_file(&name).await.unwrap());
        assert!(!cache.remove_file("not-an-entry").await.unwrap());
    }

    #[tokio::test]
    async fn clear_empties_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskBlobCache::open(dir.path(), MIB).await.unwrap();
        cache.put("a", b"1").await.unwrap();
        cache.put("b", b"2").await.unwrap();

        cache.clear().await.unwrap();
        assert!(cache.is_empty().await);
        assert_eq!(cache.size_on_disk().await, 0);
        assert!(!cache.entry_path("a").exists());
    }

    #[tokio::test]
    async fn externally_deleted_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskBlobCache::open(dir.path(), MIB).await.unwrap();
        let path = cache.put("k", b"abc").await.unwrap();
        std::fs::remove_file(path).unwrap();

        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.contains("k").await);
        assert_eq!(cache.size_on_disk().await, 0);
    }
}
