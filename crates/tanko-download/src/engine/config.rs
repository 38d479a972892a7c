//! Engine tuning knobs.

use std::time::Duration;

use tanko_core::{DEFAULT_IMAGE_RETRIES, Settings};

use crate::queue::EVENT_CAPACITY;

/// Longest wait between two image attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for [`DownloadEngine`](super::DownloadEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attempts per page image, at least 1.
    pub image_retries: u32,
    /// Delay before the second attempt; doubles for every further one.
    pub retry_base_delay: Duration,
    /// Image URLs resolved ahead of the page being downloaded.
    pub url_lookahead: usize,
    /// Minimum spacing of byte-progress events for one page.
    pub progress_interval: Duration,
    /// Queue events buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_retries: DEFAULT_IMAGE_RETRIES,
            retry_base_delay: Duration::from_millis(500),
            url_lookahead: 3,
            progress_interval: Duration::from_millis(100),
            event_capacity: EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            image_retries: settings.effective_image_retries(),
            ..Self::default()
        }
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = EngineConfig {
            retry_base_delay: Duration::from_millis(100),
            ..EngineConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn settings_override_retries() {
        let settings = Settings {
            image_retries: Some(7),
            ..Settings::with_defaults()
        };
        assert_eq!(EngineConfig::from_settings(&settings).image_retries, 7);
    }
}
