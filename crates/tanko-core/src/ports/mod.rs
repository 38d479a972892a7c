//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the download engine expects from the outside
//! world. They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP client types in any signature
//! - No preference storage details; live values travel over `watch` channels
//! - A missing notifier must never change engine behavior

mod notifier;
mod preferences;
mod source;

pub use notifier::{NoopNotifier, NotifierPort};
pub use preferences::{PreferencesPort, WatchPreferences};
pub use source::{ImageStream, SourceError, SourcePort};
