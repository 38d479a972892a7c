#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

mod config;
mod error;
mod http;
mod links;
mod models;
mod source;

// ============================================================================
// Public API
// ============================================================================

pub use config::SourceClientConfig;
pub use error::{HttpError, HttpResult};
pub use http::{HttpBackend, ReqwestBackend};
pub use links::origin_of;
pub use source::{DefaultManifestSource, ManifestSource};
