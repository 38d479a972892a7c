//! Public configuration for the manifest source client.

use std::time::Duration;

/// Configuration for the HTTP client behind a [`ManifestSource`](crate::ManifestSource).
///
/// # Example
///
/// ```
/// use tanko_source::SourceClientConfig;
/// use std::time::Duration;
///
/// let config = SourceClientConfig::new()
///     .with_timeout(Duration::from_secs(60))
///     .with_user_agent("my-reader/1.0");
/// ```
#[derive(Debug, Clone)]
pub struct SourceClientConfig {
    /// User agent string for HTTP requests
    pub(crate) user_agent: String,
    /// Whole-request timeout, body included
    pub(crate) timeout: Duration,
    /// Optional bearer token sent with every request
    pub(crate) token: Option<String>,
    /// Retries after the first attempt for 5xx and transport errors
    pub(crate) max_retries: u8,
    /// Base delay for exponential backoff
    pub(crate) retry_base_delay: Duration,
}

impl Default for SourceClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("tanko/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            token: None,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl SourceClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the request timeout.
    ///
    /// Defaults to 30 seconds. The timeout covers streaming the body, so
    /// sources serving very large images may need more.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_optional_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Set the maximum number of retry attempts for transient errors.
    ///
    /// Defaults to 3 retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Defaults to 500ms, doubled on every further attempt.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub(crate) fn backoff(&self, attempt: u8) -> Duration {
        let factor = 2u32.saturating_pow(u32::from(attempt.saturating_sub(1)));
        self.retry_base_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SourceClientConfig::new();
        assert!(config.user_agent.starts_with("tanko/"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.token.is_none());
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_builder_pattern() {
        let config = SourceClientConfig::new()
            .with_user_agent("test-agent")
            .with_timeout(Duration::from_secs(60))
            .with_token("secret")
            .with_max_retries(5);

        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.token, Some("secret".to_string()));
        assert_eq!(config.max_retries, 5);

        let cleared = config.with_optional_token(None);
        assert!(cleared.token.is_none());
    }

    #[test]
    fn backoff_doubles() {
        let config = SourceClientConfig::new().with_retry_delay(Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
    }
}
