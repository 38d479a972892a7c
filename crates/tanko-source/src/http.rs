//! HTTP backend abstraction.
//!
//! [`ManifestSource`](crate::ManifestSource) talks to the network only
//! through [`HttpBackend`], so tests can swap in canned responses. The
//! production implementation uses reqwest with retry for transient errors.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tanko_core::{ImageStream, SourceError};
use tracing::debug;
use url::Url;

use crate::config::SourceClientConfig;
use crate::error::{HttpError, HttpResult};

/// Fetches manifests and image bodies.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Fetch JSON from a URL and deserialize it.
    async fn get_json<T: DeserializeOwned + Send>(&self, url: &Url) -> HttpResult<T>;

    /// Open a streaming GET. Only the response head is awaited.
    async fn get_stream(&self, url: &Url) -> HttpResult<ImageStream>;
}

/// Production HTTP backend using reqwest.
///
/// Server errors (5xx) and transport errors are retried with exponential
/// backoff; other statuses fail immediately.
pub struct ReqwestBackend {
    client: reqwest::Client,
    config: SourceClientConfig,
}

impl ReqwestBackend {
    pub fn new(config: &SourceClientConfig) -> HttpResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn build_request(&self, url: &Url) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url.as_str());
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn fetch_with_retry(&self, url: &Url) -> HttpResult<reqwest::Response> {
        let max_retries = self.config.max_retries;
        let mut attempt: u8 = 0;

        loop {
            if attempt > 0 {
                let delay: Duration = self.config.backoff(attempt);
                debug!(target: "tanko.source", %url, attempt, ?delay, "Retrying request");
                tokio::time::sleep(delay).await;
            }

            match self.build_request(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_server_error() && attempt < max_retries {
                        attempt += 1;
                        continue;
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(HttpError::NotFound {
                            url: url.to_string(),
                        });
                    }
                    return Err(HttpError::RequestFailed {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Err(e) if attempt < max_retries => {
                    debug!(target: "tanko.source", %url, error = %e, "Transport error");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn get_json<T: DeserializeOwned + Send>(&self, url: &Url) -> HttpResult<T> {
        let response = self.fetch_with_retry(url).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_stream(&self, url: &Url) -> HttpResult<ImageStream> {
        let response = self.fetch_with_retry(url).await?;
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SourceError::network(e.to_string())))
            .boxed();
        Ok(ImageStream::new(content_length, body))
    }
}
