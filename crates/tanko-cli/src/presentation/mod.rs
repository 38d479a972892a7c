//! Terminal output helpers.

pub mod progress;

pub use progress::{ChapterProgress, format_label};
