use std::collections::HashMap;

use http::StatusCode;
use serde::Serialize;

use crate::MallKey;

/// Running counters of one mall. All fields only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricState {
    /// Number of recorded dependency attempts
    pub total_calls: u64,
    /// Number of recorded attempts that were rejected with 429
    pub rejections: u64,
    /// Sum of the queue delays of all recorded attempts
    pub sum_queue_delay_ms: u64,
}

impl MetricState {
    /// Account for one attempt
    pub fn record(&mut self, status: StatusCode, queue_delay_ms: u64) {
        self.total_calls += 1;
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.rejections += 1;
        }
        self.sum_queue_delay_ms = self.sum_queue_delay_ms.saturating_add(queue_delay_ms);
    }

    /// Mean queue delay, `0.0` before the first attempt
    #[must_use]
    pub fn avg_queue_delay_ms(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self.sum_queue_delay_ms as f64 / self.total_calls as f64;
        avg
    }

    /// Point-in-time view of these counters
    #[must_use]
    pub fn snapshot(&self, key: &MallKey) -> MallMetrics {
        MallMetrics {
            key: key.clone(),
            total_calls: self.total_calls,
            rejections: self.rejections,
            avg_queue_delay_ms: self.avg_queue_delay_ms(),
        }
    }
}

/// Metrics of one mall as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MallMetrics {
    /// The mall these metrics belong to
    pub key: MallKey,
    /// Number of dependency attempts, retries included
    pub total_calls: u64,
    /// Number of attempts rejected with 429
    pub rejections: u64,
    /// Mean time between admission and the end of an attempt
    pub avg_queue_delay_ms: f64,
}

impl MallMetrics {
    /// Zero-valued metrics for a mall nothing was recorded for
    #[must_use]
    pub fn empty(key: MallKey) -> Self {
        Self {
            key,
            total_calls: 0,
            rejections: 0,
            avg_queue_delay_ms: 0.0,
        }
    }

    /// Share of attempts that were rejected (0.0 to 1.0)
    #[must_use]
    pub fn rejection_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.rejections as f64 / self.total_calls as f64;
        rate
    }

    /// Get human-readable summary of the metrics
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rejected_pct = (self.rejection_rate() * 100.0).round() as u64;
        format!(
            "{} calls ({} rejected, {}%), avg queue delay: {:.0}ms",
            self.total_calls, self.rejections, rejected_pct, self.avg_queue_delay_ms
        )
    }
}

/// A [`HashMap`] mapping malls to their [`MallMetrics`]
#[derive(Debug, Default, Serialize)]
pub struct MallMetricsMap(HashMap<MallKey, MallMetrics>);

impl MallMetricsMap {
    /// Sort by call count (descending), then by key for a stable order
    #[must_use]
    pub fn sorted(&self) -> Vec<MallMetrics> {
        let mut sorted: Vec<_> = self.0.values().cloned().collect();
        sorted.sort_by(|a, b| {
            b.total_calls
                .cmp(&a.total_calls)
                .then_with(|| a.key.cmp(&b.key))
        });
        sorted
    }

    /// Number of malls with recorded metrics
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no mall has recorded metrics
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Metrics of a single mall, if any were recorded
    #[must_use]
    pub fn get(&self, key: &MallKey) -> Option<&MallMetrics> {
        self.0.get(key)
    }
}

impl From<HashMap<MallKey, MallMetrics>> for MallMetricsMap {
    fn from(value: HashMap<MallKey, MallMetrics>) -> Self {
        Self(value)
    }
}
