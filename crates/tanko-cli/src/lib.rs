#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

// Used only by the binary target
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod cache_commands;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use cache_commands::CacheCommand;
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
