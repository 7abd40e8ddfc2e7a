//! Per-mall call workers.
//!
//! A [`CallWorker`] owns the admission queue of one mall. Its task drains
//! the queue one request at a time: wait for a pacing slot, call the
//! downstream (retrying congestion rejections), slow down when the bucket is
//! filling up, then deliver the outcome.

mod backoff;
mod throttle;

pub use backoff::{
    HIGH_USAGE_DELAY, HIGH_USAGE_RATIO, MODERATE_USAGE_DELAY, MODERATE_USAGE_RATIO, RetryPolicy,
    adaptive_delay,
};
pub use throttle::Pacing;

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::sleep;

use crate::downstream::{Attempt, Downstream};
use crate::metrics::MetricsAggregator;
use crate::{CallOutcome, CallRequest, GatewayConfig, MallKey, QueuedEnvelope};
use throttle::Throttle;

/// Effective settings of one mall's worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Pacing of calls to the downstream
    pub pacing: Pacing,
    /// Bound of the admission queue
    pub queue_capacity: usize,
    /// Retry of congestion rejections
    pub retry: RetryPolicy,
}

impl WorkerSettings {
    /// Resolve the settings for `key`, applying its overrides from `config`
    #[must_use]
    pub fn for_mall(config: &GatewayConfig, key: &MallKey) -> Self {
        let mall = config.mall(key);
        Self {
            pacing: Pacing::per_second(mall.effective_max_requests_per_second(config)),
            queue_capacity: mall.effective_queue_capacity(config),
            retry: RetryPolicy::new(config.max_retries),
        }
    }
}

/// Handle to the worker serving one mall.
///
/// Admission never waits: a request either enters the bounded queue or, if
/// the queue is full, is dropped (the newest request loses). Dropping the
/// last handle closes the queue; the worker finishes what is queued and
/// stops.
#[derive(Debug)]
pub struct CallWorker {
    key: MallKey,
    name: String,
    queue: mpsc::Sender<QueuedEnvelope>,
}

impl CallWorker {
    /// Start the worker task for `key`
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime or if
    /// `settings.queue_capacity` is zero
    #[must_use]
    pub fn spawn(
        key: MallKey,
        settings: &WorkerSettings,
        downstream: Arc<dyn Downstream>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        let name = key.worker_name();
        let (queue, requests) = mpsc::channel(settings.queue_capacity);

        debug!(
            "Starting worker {name} (queue {}, pacing {}ms, burst {})",
            settings.queue_capacity,
            settings.pacing.interval().as_millis(),
            settings.pacing.burst()
        );

        let worker = WorkerLoop {
            key: key.clone(),
            name: name.clone(),
            throttle: Throttle::new(settings.pacing),
            retry: settings.retry,
            downstream,
            metrics,
        };
        tokio::spawn(worker.run(requests));

        Self { key, name, queue }
    }

    /// Admit a request into the queue.
    ///
    /// Returns `false` if the request was dropped. A dropped request never
    /// yields an outcome; its caller observes a closed reply channel.
    pub fn admit(&self, request: CallRequest) -> bool {
        match self.queue.try_send(QueuedEnvelope::admit(request)) {
            Ok(()) => true,
            Err(TrySendError::Full(envelope)) => {
                warn!(
                    "Worker {} queue is full ({} waiting), dropping newest request payload={}",
                    self.name,
                    self.queue.max_capacity(),
                    envelope.request.payload
                );
                false
            }
            Err(TrySendError::Closed(envelope)) => {
                error!(
                    "Worker {} has stopped, dropping request payload={}",
                    self.name, envelope.request.payload
                );
                false
            }
        }
    }

    /// The mall this worker serves
    #[must_use]
    pub const fn key(&self) -> &MallKey {
        &self.key
    }

    /// Log-friendly worker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of requests waiting in the queue
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Bound of the admission queue
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue.max_capacity()
    }
}

/// State owned by the worker task
#[derive(Debug)]
struct WorkerLoop {
    key: MallKey,
    name: String,
    throttle: Throttle,
    retry: RetryPolicy,
    downstream: Arc<dyn Downstream>,
    metrics: Arc<MetricsAggregator>,
}

impl WorkerLoop {
    async fn run(self, mut requests: mpsc::Receiver<QueuedEnvelope>) {
        while let Some(envelope) = requests.recv().await {
            self.throttle.until_ready().await;
            self.process(envelope).await;
        }
        debug!("Worker {} stopped", self.name);
    }

    async fn process(&self, envelope: QueuedEnvelope) {
        let attempt = self.execute_with_retry(&envelope).await;

        if attempt.status.is_success() {
            let delay = adaptive_delay(attempt.usage_ratio());
            if !delay.is_zero() {
                debug!(
                    "Worker {} bucket at {}/{}, holding result for {}ms",
                    self.name,
                    attempt.bucket_used,
                    attempt.bucket_max,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
        }

        let request = envelope.request;
        let outcome = CallOutcome::from_attempt(self.key.clone(), request.payload.clone(), attempt);
        info!(
            "Mall call mall={} payload={} status={} bucket={}/{}",
            self.key,
            outcome.payload,
            outcome.status.as_u16(),
            outcome.bucket_used,
            outcome.bucket_max
        );
        if !request.reply(outcome) {
            debug!("Worker {}: caller stopped waiting for its outcome", self.name);
        }
    }

    /// Call the downstream until the attempt is final.
    /// Every attempt is recorded, retries included.
    async fn execute_with_retry(&self, envelope: &QueuedEnvelope) -> Attempt {
        let payload = &envelope.request.payload;
        let mut retries = 0;
        loop {
            let attempt = self.downstream.call(&self.key, payload).await;
            self.metrics
                .record(&self.key, attempt.status, envelope.queue_delay_ms());

            let Some(wait) = self.retry.backoff(&attempt, retries) else {
                return attempt;
            };
            retries += 1;
            debug!(
                "Worker {} rejected at bucket {}/{}, retry {retries}/{} in {}ms",
                self.name,
                attempt.bucket_used,
                attempt.bucket_max,
                self.retry.max_retries(),
                wait.as_millis()
            );
            sleep(wait).await;
        }
    }
}
