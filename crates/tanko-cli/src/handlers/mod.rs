//! Command handlers.
//!
//! Handlers parse CLI-specific input, call into the engine or the cache,
//! and format output for the terminal. They hold no download logic.

pub mod cache;
pub mod download;
pub mod paths;
