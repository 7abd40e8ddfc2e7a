//! The rate-limited dependency that mall workers call.
//!
//! [`Downstream`] is the seam between a worker and whatever it paces calls
//! against. [`LeakyBucketApi`] is the in-process implementation: it keeps a
//! leaky bucket per mall and reports congestion with 429 responses, but it
//! never retries or waits itself.

mod leaky_bucket;

pub use leaky_bucket::LeakyBucketApi;

use async_trait::async_trait;
use http::StatusCode;
use std::fmt::Debug;
use std::time::Duration;

use crate::MallKey;

/// The answer to a single call attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// 200 on success, 429 when the mall's bucket is saturated
    pub status: StatusCode,
    /// Response body; `None` for rejections
    pub body: Option<String>,
    /// Bucket level observed by this attempt
    pub bucket_used: u32,
    /// Bucket capacity
    pub bucket_max: u32,
    /// How long the dependency asks the caller to wait before retrying.
    /// Zero unless the attempt was rejected.
    pub retry_after: Duration,
}

impl Attempt {
    /// Whether the dependency rejected the call because of congestion
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
    }

    /// Share of the bucket in use, `0.0` when the capacity is unknown
    #[must_use]
    pub fn usage_ratio(&self) -> f64 {
        if self.bucket_max == 0 {
            0.0
        } else {
            f64::from(self.bucket_used) / f64::from(self.bucket_max)
        }
    }
}

/// A dependency that can be called on behalf of a mall
#[async_trait]
pub trait Downstream: Debug + Send + Sync {
    /// Perform one attempt. Implementations must not retry.
    async fn call(&self, key: &MallKey, payload: &str) -> Attempt;
}
