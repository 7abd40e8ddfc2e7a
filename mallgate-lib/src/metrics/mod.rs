//! Per-mall usage metrics.
//!
//! Workers report every dependency attempt to a shared
//! [`MetricsAggregator`]; callers read point-in-time snapshots from it.

mod stats;

pub use stats::{MallMetrics, MallMetricsMap, MetricState};

use dashmap::DashMap;
use http::StatusCode;

use crate::MallKey;

/// Accumulates per-mall call counts, rejections and queue delays.
///
/// Each mall's counters are updated under its map shard's lock, so a
/// snapshot always reflects a whole number of recorded attempts. Malls in
/// different shards never contend. State is created on the first record and
/// kept for the lifetime of the aggregator; reads never create state.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    states: DashMap<MallKey, MetricState>,
}

impl MetricsAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dependency attempt for `key`
    pub fn record(&self, key: &MallKey, status: StatusCode, queue_delay_ms: u64) {
        if let Some(mut state) = self.states.get_mut(key) {
            state.record(status, queue_delay_ms);
            return;
        }
        self.states
            .entry(key.clone())
            .or_default()
            .record(status, queue_delay_ms);
    }

    /// Current metrics of `key`; zero-valued for malls without records
    #[must_use]
    pub fn snapshot(&self, key: &MallKey) -> MallMetrics {
        self.states.get(key).map_or_else(
            || MallMetrics::empty(key.clone()),
            |state| state.snapshot(key),
        )
    }

    /// Current metrics of every mall with at least one record
    #[must_use]
    pub fn all(&self) -> MallMetricsMap {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot(entry.key())))
            .collect::<std::collections::HashMap<_, _>>()
            .into()
    }

    /// Number of malls with recorded metrics
    #[must_use]
    pub fn tracked_malls(&self) -> usize {
        self.states.len()
    }
}
