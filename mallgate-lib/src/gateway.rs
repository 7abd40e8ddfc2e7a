use dashmap::DashMap;
use log::debug;
use std::sync::Arc;

use crate::downstream::{Downstream, LeakyBucketApi};
use crate::metrics::{MallMetrics, MallMetricsMap, MetricsAggregator};
use crate::worker::{CallWorker, WorkerSettings};
use crate::{CallOutcome, CallRequest, GatewayConfig, MallKey, PendingOutcome, Result};

/// Routes calls to the worker of their mall.
///
/// The `Gateway` is the single entry point for all malls. Workers are
/// created on the first call for a mall and reused for every later one, so
/// each mall has exactly one queue, one pacing schedule and one retry loop,
/// and congestion in one mall never delays another.
///
/// # Architecture
///
/// - One [`CallWorker`] per mall key, created lazily
/// - Workers are never evicted; a mall's worker lives as long as the gateway
/// - The registry is a `DashMap`, so routing to different malls does not
///   contend on a single lock
/// - Cloning a `Gateway` is cheap and shares the registry
#[derive(Debug, Clone)]
pub struct Gateway {
    /// Map of mall key to its worker, created on demand
    workers: Arc<DashMap<MallKey, Arc<CallWorker>>>,

    /// Global settings and per-mall overrides
    config: Arc<GatewayConfig>,

    /// The rate-limited dependency shared by all workers
    downstream: Arc<dyn Downstream>,

    /// Per-mall call statistics, fed by the workers
    metrics: Arc<MetricsAggregator>,
}

impl Gateway {
    /// Create a gateway calling `downstream` and reporting to `metrics`
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::InvalidConfig`] if `config` does not
    /// validate
    pub fn new(
        config: GatewayConfig,
        downstream: Arc<dyn Downstream>,
        metrics: Arc<MetricsAggregator>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            workers: Arc::new(DashMap::new()),
            config: Arc::new(config),
            downstream,
            metrics,
        })
    }

    /// Create a gateway backed by a fresh [`LeakyBucketApi`] built from
    /// `config` and a fresh [`MetricsAggregator`]
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::InvalidConfig`] if `config` does not
    /// validate
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime
    ///
    /// # Examples
    ///
    /// ```
    /// use mallgate_lib::{Gateway, GatewayConfig, MallKey};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), mallgate_lib::ErrorKind> {
    /// let gateway = Gateway::with_simulator(GatewayConfig::default())?;
    /// let outcome = gateway.call(MallKey::new("mall-a")?, "hello").await?;
    /// assert_eq!(outcome.result.as_deref(), Some("world"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_simulator(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let downstream = Arc::new(LeakyBucketApi::from_config(&config));
        Self::new(config, downstream, Arc::new(MetricsAggregator::new()))
    }

    /// Hand a call to the worker of `key`, creating the worker if needed.
    ///
    /// Never waits for the call to be processed. The returned handle
    /// resolves to the call's outcome, or to
    /// [`crate::ErrorKind::RequestDropped`] if the mall's queue was full.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime
    pub fn route(&self, key: MallKey, payload: impl Into<String>) -> PendingOutcome {
        let worker = self.worker(&key);
        let (request, pending) = CallRequest::new(key, payload);
        worker.admit(request);
        pending
    }

    /// Route a call and wait for its outcome
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::RequestDropped`] if the mall's queue was
    /// full
    pub async fn call(&self, key: MallKey, payload: impl Into<String>) -> Result<CallOutcome> {
        self.route(key, payload).await
    }

    /// Get the worker for `key`, creating it on first use.
    /// Concurrent first calls for the same key create a single worker.
    fn worker(&self, key: &MallKey) -> Arc<CallWorker> {
        if let Some(worker) = self.workers.get(key) {
            return Arc::clone(worker.value());
        }

        let worker = self.workers.entry(key.clone()).or_insert_with(|| {
            debug!("Creating worker for mall {key}");
            let settings = WorkerSettings::for_mall(&self.config, key);
            Arc::new(CallWorker::spawn(
                key.clone(),
                &settings,
                Arc::clone(&self.downstream),
                Arc::clone(&self.metrics),
            ))
        });
        Arc::clone(worker.value())
    }

    /// The aggregator the workers report to
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Point-in-time metrics of one mall
    #[must_use]
    pub fn snapshot(&self, key: &MallKey) -> MallMetrics {
        self.metrics.snapshot(key)
    }

    /// Point-in-time metrics of every mall that has been called
    #[must_use]
    pub fn all_metrics(&self) -> MallMetricsMap {
        self.metrics.all()
    }

    /// Number of malls with a worker
    #[must_use]
    pub fn active_worker_count(&self) -> usize {
        self.workers.len()
    }

    /// The configuration this gateway was built with
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
