//! Domain types for chapters and pages.
//!
//! Pure data types with no I/O dependencies. Catalog records (`Manga`,
//! `Chapter`) are produced by the host application's catalog storage; the
//! download engine only reads them.

mod ids;
mod page;

pub use ids::{Chapter, ChapterId, Manga, MangaId, SourceId};
pub use page::{Page, PageStatus, PageStub};
