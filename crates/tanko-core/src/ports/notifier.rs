//! Notifier port for host UI notifications.

use crate::domain::ChapterId;
use crate::download::ChapterNotice;

/// Receives coarse per-chapter milestones (queued, downloading, done, error).
///
/// Implementations must not block; the engine calls this from worker tasks.
pub trait NotifierPort: Send + Sync {
    fn notify(&self, chapter_id: ChapterId, notice: ChapterNotice);
}

/// A notifier that discards every notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NoopNotifier {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NotifierPort for NoopNotifier {
    fn notify(&self, _chapter_id: ChapterId, _notice: ChapterNotice) {
        // Intentionally do nothing
    }
}
