use anyhow::{Context, Result};
use serde_json::json;

use super::{Report, ReportFormatter};

pub(crate) struct Json;

impl Json {
    pub(crate) const fn new() -> Self {
        Self
    }
}

impl ReportFormatter for Json {
    /// Format the report as a JSON object with the calls in input order and
    /// the metrics sorted by call count
    fn format(&self, report: &Report) -> Result<String> {
        let output = json!({
            "success": report.is_success(),
            "calls": report.calls,
            "mall_metrics": report.metrics.sorted(),
        });
        serde_json::to_string_pretty(&output).context("Cannot format report as JSON")
    }
}
