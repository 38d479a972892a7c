//! Progress throttling for page downloads.

mod throttle;

pub use throttle::{ProgressThrottle, percent_of};
