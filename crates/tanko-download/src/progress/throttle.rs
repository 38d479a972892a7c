//! Page progress throttling.
//!
//! Rate-limits byte-progress events so a fast image stream does not flood
//! queue subscribers.

use std::time::{Duration, Instant};

/// Rate limiter for one page's progress percentages.
///
/// A percentage is emitted only when it differs from the last emitted value
/// and either the interval has elapsed or the page reached 100%.
#[derive(Debug)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    last_percent: Option<u8>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            last_percent: None,
            min_interval,
        }
    }

    /// Throttle with a 100ms interval.
    pub const fn default_interval() -> Self {
        Self::new(Duration::from_millis(100))
    }

    /// Whether `percent` should be published now. Records it if so.
    pub fn should_emit(&mut self, percent: u8) -> bool {
        if self.last_percent == Some(percent) {
            return false;
        }
        let now = Instant::now();
        let due = match self.last_emit {
            Some(last) => percent >= 100 || now.duration_since(last) >= self.min_interval,
            None => true,
        };
        if due {
            self.last_emit = Some(now);
            self.last_percent = Some(percent);
        }
        due
    }

    /// Forget history so the next value is always emitted (new attempt).
    pub const fn reset(&mut self) {
        self.last_emit = None;
        self.last_percent = None;
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::default_interval()
    }
}

/// Integer percentage of `done` over `total`, capped at 100.
///
/// Unknown or zero totals report 0 until the download completes.
pub fn percent_of(done: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => u8::try_from(done.min(total) * 100 / total).unwrap_or(100),
        _ => 0,
    }
}
