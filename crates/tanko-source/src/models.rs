//! Wire format of chapter and page manifests.
//!
//! ```text
//! GET {chapter url}  -> { "pages": [ { "url": "p/1" }, { "image_url": "img/2.jpg" } ] }
//! GET {page url}     -> { "image_url": "https://cdn.example/1.jpg" }
//! ```
//!
//! A page entry needs at least one of `url` or `image_url`. Extra fields are
//! ignored.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterManifest {
    #[serde(default)]
    pub pages: Vec<ManifestPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestPage {
    /// Page document to scrape for the image URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageManifest {
    pub image_url: String,
}
