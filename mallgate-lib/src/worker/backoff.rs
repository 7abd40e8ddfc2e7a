//! Retry and adaptive-delay decisions of a mall worker.

use http::StatusCode;
use std::time::Duration;

use crate::downstream::Attempt;

/// Usage ratio above which a successful call is followed by [`HIGH_USAGE_DELAY`]
pub const HIGH_USAGE_RATIO: f64 = 0.8;

/// Extra delay after a successful call that left the bucket nearly full
pub const HIGH_USAGE_DELAY: Duration = Duration::from_millis(500);

/// Usage ratio above which a successful call is followed by [`MODERATE_USAGE_DELAY`]
pub const MODERATE_USAGE_RATIO: f64 = 0.5;

/// Extra delay after a successful call that left the bucket more than half full
pub const MODERATE_USAGE_DELAY: Duration = Duration::from_millis(200);

/// Whether a result is worth another attempt.
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    /// Only congestion rejections are transient. Any other failure of the
    /// dependency is final on the first attempt.
    fn should_retry(&self) -> bool {
        *self == StatusCode::TOO_MANY_REQUESTS
    }
}

impl RetryExt for Attempt {
    fn should_retry(&self) -> bool {
        self.status.should_retry()
    }
}

/// Bounded retry of congestion rejections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// Allow up to `max_retries` retries per request
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Maximum number of retries per request
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// How long to wait before retrying `attempt`, given the number of
    /// retries already made. `None` means the attempt is final.
    #[must_use]
    pub fn backoff(&self, attempt: &Attempt, retries: u32) -> Option<Duration> {
        (attempt.should_retry() && retries < self.max_retries).then_some(attempt.retry_after)
    }
}

/// Extra delay to apply after a successful call with the given bucket usage
#[must_use]
pub fn adaptive_delay(usage_ratio: f64) -> Duration {
    if usage_ratio > HIGH_USAGE_RATIO {
        HIGH_USAGE_DELAY
    } else if usage_ratio > MODERATE_USAGE_RATIO {
        MODERATE_USAGE_DELAY
    } else {
        Duration::ZERO
    }
}
