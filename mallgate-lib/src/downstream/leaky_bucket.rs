use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use http::StatusCode;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use super::{Attempt, Downstream};
use crate::{GatewayConfig, MallKey};

/// Payload that the simulated API answers with something other than an echo
const GREETING: &str = "hello";
const GREETING_REPLY: &str = "world";

type Buckets = DashMap<MallKey, AtomicU32>;

/// Stand-in for a rate-limited downstream API.
///
/// Every mall has its own bucket. A call pours one unit into the bucket and
/// is rejected with 429 if that overflows the capacity; a rejected call does
/// not occupy capacity. A background task drains every bucket by
/// `leak_rate_per_second` once per `leak_interval`, floored at zero.
///
/// Bucket levels are atomics behind a sharded map, so calls and leak ticks
/// never lose updates and different malls do not serialize on a shared lock.
///
/// The leak task is aborted when the simulator is dropped.
#[derive(Debug)]
pub struct LeakyBucketApi {
    buckets: Arc<Buckets>,
    capacity: u32,
    leak_rate_per_second: u32,
    leak_task: JoinHandle<()>,
}

impl LeakyBucketApi {
    /// Create a simulator that leaks once per second
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime
    #[must_use]
    pub fn new(capacity: NonZeroU32, leak_rate_per_second: NonZeroU32) -> Self {
        Self::with_leak_interval(capacity, leak_rate_per_second, Duration::from_secs(1))
    }

    /// Create a simulator from the bucket settings of a [`GatewayConfig`]
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime, or if the leak interval
    /// is zero (rejected by [`GatewayConfig::validate`])
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::with_leak_interval(
            config.bucket_capacity,
            config.leak_rate_per_second,
            config.leak_interval,
        )
    }

    /// Create a simulator with a custom leak period
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime or if `leak_interval` is zero
    #[must_use]
    pub fn with_leak_interval(
        capacity: NonZeroU32,
        leak_rate_per_second: NonZeroU32,
        leak_interval: Duration,
    ) -> Self {
        let buckets = Arc::new(Buckets::new());
        let leak_rate_per_second = leak_rate_per_second.get();

        let leak_task = tokio::spawn({
            let buckets = Arc::clone(&buckets);
            async move {
                let mut ticker = interval_at(Instant::now() + leak_interval, leak_interval);
                loop {
                    ticker.tick().await;
                    leak(&buckets, leak_rate_per_second);
                }
            }
        });

        Self {
            buckets,
            capacity: capacity.get(),
            leak_rate_per_second,
            leak_task,
        }
    }

    /// Perform one call on behalf of `key`
    pub fn try_call(&self, key: &MallKey, payload: &str) -> Attempt {
        let bucket = self.bucket(key);
        let level = bucket.fetch_add(1, Ordering::AcqRel).saturating_add(1);

        if level > self.capacity {
            // A leak tick may have drained the bucket in between; never go below zero.
            let _ = bucket.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(1))
            });
            let over = level - self.capacity;
            let retry_after = over.div_ceil(self.leak_rate_per_second) + 1;
            return Attempt {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: None,
                bucket_used: level,
                bucket_max: self.capacity,
                retry_after: Duration::from_secs(u64::from(retry_after)),
            };
        }

        let body = if payload == GREETING {
            GREETING_REPLY.to_string()
        } else {
            payload.to_string()
        };
        Attempt {
            status: StatusCode::OK,
            body: Some(body),
            bucket_used: level,
            bucket_max: self.capacity,
            retry_after: Duration::ZERO,
        }
    }

    /// Current bucket level of `key`, zero for malls never called
    #[must_use]
    pub fn level(&self, key: &MallKey) -> u32 {
        self.buckets
            .get(key)
            .map_or(0, |bucket| bucket.load(Ordering::Acquire))
    }

    /// Bucket capacity shared by all malls
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Drain every bucket once, as the background task does on each tick
    pub fn leak_now(&self) {
        leak(&self.buckets, self.leak_rate_per_second);
    }

    fn bucket(&self, key: &MallKey) -> Ref<'_, MallKey, AtomicU32> {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket;
        }
        self.buckets.entry(key.clone()).or_default().downgrade()
    }
}

fn leak(buckets: &Buckets, rate: u32) {
    for bucket in buckets.iter() {
        let _ = bucket.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            Some(current.saturating_sub(rate))
        });
    }
}

#[async_trait]
impl Downstream for LeakyBucketApi {
    async fn call(&self, key: &MallKey, payload: &str) -> Attempt {
        self.try_call(key, payload)
    }
}

impl Drop for LeakyBucketApi {
    fn drop(&mut self) {
        self.leak_task.abort();
    }
}
