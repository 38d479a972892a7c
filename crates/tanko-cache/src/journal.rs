//! Append-only journal of cache operations.
//!
//! The journal is the only durable record of recency. It is replayed on
//! open, then rewritten compactly, and appended to on every operation.

use std::path::Path;

use indexmap::IndexMap;

use crate::error::{CacheError, CacheResult};

pub const JOURNAL_FILE: &str = "journal";
pub const JOURNAL_TMP_FILE: &str = "journal.tmp";
pub const JOURNAL_BACKUP_FILE: &str = "journal.bkp";

const MAGIC: &str = "tanko.blobcache";
const VERSION: &str = "1";

/// Redundant lines tolerated before a compaction is forced.
pub const COMPACT_THRESHOLD: usize = 2000;

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    /// Entry committed with its size in bytes.
    Clean { hash: String, size: u64 },
    /// Entry read; moves it to the most recently used end.
    Read { hash: String },
    /// Entry removed or evicted.
    Remove { hash: String },
}

impl JournalOp {
    /// Render as a single newline-terminated line.
    pub fn to_line(&self) -> String {
        match self {
            Self::Clean { hash, size } => format!("CLEAN {hash} {size}\n"),
            Self::Read { hash } => format!("READ {hash}\n"),
            Self::Remove { hash } => format!("REMOVE {hash}\n"),
        }
    }

    fn parse(line_no: usize, line: &str) -> CacheResult<Self> {
        let mut parts = line.split(' ');
        let op = parts.next().unwrap_or_default();
        let hash = parts
            .next()
            .filter(|h| is_entry_name(h))
            .ok_or_else(|| CacheError::journal(line_no, format!("bad key in '{line}'")))?
            .to_string();

        let parsed = match op {
            "CLEAN" => {
                let size = parts
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| CacheError::journal(line_no, format!("bad size in '{line}'")))?;
                Self::Clean { hash, size }
            }
            "READ" => Self::Read { hash },
            "REMOVE" => Self::Remove { hash },
            other => return Err(CacheError::journal(line_no, format!("unknown op '{other}'"))),
        };

        if parts.next().is_some() {
            return Err(CacheError::journal(line_no, format!("trailing data in '{line}'")));
        }
        Ok(parsed)
    }
}

/// Names the cache uses for its own bookkeeping.
pub fn is_reserved(name: &str) -> bool {
    matches!(name, JOURNAL_FILE | JOURNAL_TMP_FILE | JOURNAL_BACKUP_FILE)
}

/// Whether `name` looks like a committed entry file (64 lowercase hex chars).
pub fn is_entry_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Journal header lines.
pub fn header() -> String {
    format!("{MAGIC}\n{VERSION}\n\n")
}

/// Result of replaying a journal.
#[derive(Debug, Default)]
pub struct Replay {
    /// Live entries in least- to most-recently-used order.
    pub entries: IndexMap<String, u64>,
    /// Lines that no longer describe a live entry.
    pub redundant: usize,
}

/// Rebuild the LRU index from journal text.
///
/// A truncated final line (crash mid-append) is ignored; any other malformed
/// line is an error.
pub fn replay(text: &str) -> CacheResult<Replay> {
    let mut lines = text.split('\n');
    if lines.next() != Some(MAGIC) {
        return Err(CacheError::journal(1, "missing magic"));
    }
    if lines.next() != Some(VERSION) {
        return Err(CacheError::journal(2, "unsupported version"));
    }
    if lines.next() != Some("") {
        return Err(CacheError::journal(3, "missing blank line"));
    }

    // The last piece is either the empty string after the final newline or
    // a line cut short by a crash; neither is a complete record.
    let body: Vec<&str> = lines.collect();
    let complete = &body[..body.len().saturating_sub(1)];

    let mut replay = Replay::default();
    let mut total = 0usize;
    for (offset, line) in complete.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        total += 1;
        match JournalOp::parse(offset + 4, line)? {
            JournalOp::Clean { hash, size } => {
                replay.entries.shift_remove(&hash);
                replay.entries.insert(hash, size);
            }
            JournalOp::Read { hash } => {
                if let Some(size) = replay.entries.shift_remove(&hash) {
                    replay.entries.insert(hash, size);
                }
            }
            JournalOp::Remove { hash } => {
                replay.entries.shift_remove(&hash);
            }
        }
    }
    replay.redundant = total.saturating_sub(replay.entries.len());
    Ok(replay)
}

/// Full journal text describing exactly `entries`.
pub fn compacted(entries: &IndexMap<String, u64>) -> String {
    let mut text = header();
    for (hash, size) in entries {
        text.push_str(
            &JournalOp::Clean {
                hash: hash.clone(),
                size: *size,
            }
            .to_line(),
        );
    }
    text
}

/// Replace the journal in `dir` with `text` without ever leaving the
/// directory journal-less.
///
/// `journal.tmp` is written first; the live journal moves to `journal.bkp`
/// before the swap and the backup is deleted afterwards.
pub async fn rewrite(dir: &Path, text: &str) -> CacheResult<()> {
    let tmp = dir.join(JOURNAL_TMP_FILE);
    let live = dir.join(JOURNAL_FILE);
    let backup = dir.join(JOURNAL_BACKUP_FILE);

    tokio::fs::write(&tmp, text)
        .await
        .map_err(|e| CacheError::io(&tmp, e))?;
    if tokio::fs::try_exists(&live).await.unwrap_or(false) {
        tokio::fs::rename(&live, &backup)
            .await
            .map_err(|e| CacheError::io(&live, e))?;
    }
    tokio::fs::rename(&tmp, &live)
        .await
        .map_err(|e| CacheError::io(&tmp, e))?;
    match tokio::fs::remove_file(&backup).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(&backup, e)),
    }
}

/// Recover from a crash in the middle of [`rewrite`].
///
/// If the live journal exists the backup is stale; otherwise the backup is
/// the most recent complete journal.
pub async fn restore_backup(dir: &Path) -> CacheResult<()> {
    let live = dir.join(JOURNAL_FILE);
    let backup = dir.join(JOURNAL_BACKUP_FILE);
    if !tokio::fs::try_exists(&backup).await.unwrap_or(false) {
        return Ok(());
    }
    if tokio::fs::try_exists(&live).await.unwrap_or(false) {
        tokio::fs::remove_file(&backup)
            .await
            .map_err(|e| CacheError::io(&backup, e))
    } else {
        tokio::fs::rename(&backup, &live)
            .await
            .map_err(|e| CacheError::io(&backup, e))
    }
}
