use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// Pacing of a single mall's calls.
///
/// Calls are released on a GCRA schedule: one every
/// `1s / max_requests_per_second`, with at most `max_requests_per_second`
/// slots saved up while the worker is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing(Quota);

impl Pacing {
    /// Pace to at most `max_requests_per_second` calls per second
    #[must_use]
    pub fn per_second(max_requests_per_second: NonZeroU32) -> Self {
        Pacing(Quota::per_second(max_requests_per_second).allow_burst(max_requests_per_second))
    }

    /// Time between two released calls once the burst is used up
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.0.replenish_interval()
    }

    /// Number of calls that can be released back to back after idling
    #[must_use]
    pub fn burst(&self) -> NonZeroU32 {
        self.0.burst_size()
    }

    /// Convert into inner [`Quota`]
    #[must_use]
    pub const fn into_inner(self) -> Quota {
        self.0
    }
}

/// Release gate a worker waits on before each call.
///
/// Independent of the downstream's own congestion bucket.
#[derive(Debug)]
pub(crate) struct Throttle {
    limiter: DefaultDirectRateLimiter,
}

impl Throttle {
    pub(crate) fn new(pacing: Pacing) -> Self {
        Self {
            limiter: RateLimiter::direct(pacing.into_inner()),
        }
    }

    /// Wait for the next pacing slot
    pub(crate) async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_pacing_per_second() {
        let pacing = Pacing::per_second(NonZeroU32::new(2).unwrap());
        assert_eq!(pacing.interval(), Duration::from_millis(500));
        assert_eq!(pacing.burst().get(), 2);

        let pacing = Pacing::per_second(NonZeroU32::new(20).unwrap());
        assert_eq!(pacing.interval(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_throttle_spreads_calls() {
        let throttle = Throttle::new(Pacing::per_second(NonZeroU32::new(20).unwrap()));
        let start = Instant::now();

        // The saved-up burst is released immediately
        for _ in 0..20 {
            throttle.until_ready().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));

        // Afterwards one call every 50ms
        for _ in 0..10 {
            throttle.until_ready().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
