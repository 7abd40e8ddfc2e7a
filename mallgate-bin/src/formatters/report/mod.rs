mod compact;
mod json;

pub(crate) use compact::Compact;
pub(crate) use json::Json;

use anyhow::Result;
use mallgate_lib::metrics::MallMetricsMap;

use crate::drive::CallReport;

/// Everything printed at the end of a run
#[derive(Debug)]
pub(crate) struct Report {
    /// One entry per call, in input order
    pub(crate) calls: Vec<CallReport>,
    /// Metrics of every mall that was called
    pub(crate) metrics: MallMetricsMap,
}

impl Report {
    /// Whether every call completed with a success status
    pub(crate) fn is_success(&self) -> bool {
        self.calls.iter().all(CallReport::is_success)
    }
}

/// Trait for rendering a [`Report`] in different output formats
pub(crate) trait ReportFormatter {
    /// Format the report and return it as a string
    fn format(&self, report: &Report) -> Result<String>;
}
