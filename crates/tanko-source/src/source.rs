//! [`ManifestSource`]: a [`SourcePort`] for catalogs that publish JSON
//! manifests.

use async_trait::async_trait;
use tanko_core::{Chapter, ImageStream, Page, PageStub, SourceError, SourceId, SourcePort};
use tracing::{debug, instrument};
use url::Url;

use crate::config::SourceClientConfig;
use crate::error::{HttpError, HttpResult};
use crate::http::{HttpBackend, ReqwestBackend};
use crate::links::{parse_base, resolve};
use crate::models::{ChapterManifest, PageManifest};

/// The production source, backed by reqwest.
pub type DefaultManifestSource = ManifestSource<ReqwestBackend>;

/// Generic source over an [`HttpBackend`].
///
/// Chapter URLs resolve against `base_url`; page and image URLs found in a
/// chapter manifest resolve against the chapter URL; an image URL found in a
/// page manifest resolves against the page URL. Resolved URLs are stored
/// absolute in the page list.
pub struct ManifestSource<B: HttpBackend> {
    id: SourceId,
    name: String,
    base_url: Url,
    backend: B,
}

impl DefaultManifestSource {
    pub fn new(
        id: SourceId,
        name: impl Into<String>,
        base_url: &str,
        config: &SourceClientConfig,
    ) -> Result<Self, SourceError> {
        let backend = ReqwestBackend::new(config)?;
        Self::with_backend(id, name, base_url, backend)
    }
}

impl<B: HttpBackend> ManifestSource<B> {
    pub fn with_backend(
        id: SourceId,
        name: impl Into<String>,
        base_url: &str,
        backend: B,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            id,
            name: name.into(),
            base_url: parse_base(base_url)?,
            backend,
        })
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[cfg(test)]
    pub(crate) const fn backend(&self) -> &B {
        &self.backend
    }

    async fn fetch_page_list(&self, chapter: &Chapter) -> HttpResult<Vec<PageStub>> {
        let chapter_url = resolve(&self.base_url, &chapter.url)?;
        let manifest: ChapterManifest = self.backend.get_json(&chapter_url).await?;

        manifest
            .pages
            .into_iter()
            .enumerate()
            .map(|(position, entry)| {
                let index = u32::try_from(position)
                    .map_err(|_| HttpError::invalid("page list too long"))?;
                let source_url = entry
                    .url
                    .map(|u| resolve(&chapter_url, &u).map(String::from))
                    .transpose()?;
                let image_url = entry
                    .image_url
                    .map(|u| resolve(&chapter_url, &u).map(String::from))
                    .transpose()?;
                if source_url.is_none() && image_url.is_none() {
                    return Err(HttpError::invalid(format!(
                        "page {index} of {chapter_url} has neither url nor image_url"
                    )));
                }
                Ok(PageStub {
                    index,
                    source_url,
                    image_url,
                })
            })
            .collect()
    }

    async fn fetch_image_url(&self, page: &Page) -> HttpResult<String> {
        let source_url = page
            .source_url
            .as_deref()
            .ok_or_else(|| HttpError::invalid(format!("page {} has no page url", page.index)))?;
        let page_url = resolve(&self.base_url, source_url)?;
        let manifest: PageManifest = self.backend.get_json(&page_url).await?;
        Ok(resolve(&page_url, &manifest.image_url)?.into())
    }
}

#[async_trait]
impl<B: HttpBackend> SourcePort for ManifestSource<B> {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(target = "tanko.source", skip_all, fields(chapter_id = %chapter.id))]
    async fn page_list(&self, chapter: &Chapter) -> Result<Vec<PageStub>, SourceError> {
        let pages = self.fetch_page_list(chapter).await?;
        debug!(target: "tanko.source", pages = pages.len(), "Fetched chapter manifest");
        Ok(pages)
    }

    async fn image_url(&self, page: &Page) -> Result<String, SourceError> {
        Ok(self.fetch_image_url(page).await?)
    }

    async fn image_stream(&self, image_url: &str) -> Result<ImageStream, SourceError> {
        let url = resolve(&self.base_url, image_url)?;
        Ok(self.backend.get_stream(&url).await?)
    }
}
