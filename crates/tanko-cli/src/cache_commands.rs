//! `tanko cache` subcommands.

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
    /// Show entry count, size, and budget
    Info,
    /// Delete every cached page list and image
    Clear,
    /// Delete one cache entry by its file name
    Remove {
        /// Entry file name as listed in the cache directory
        file: String,
    },
}
