use anyhow::Result;
use std::fmt::{self, Display};

use super::{Report, ReportFormatter};
use crate::drive::CallReport;

struct CompactCall<'a>(&'a CallReport);

impl Display for CompactCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            CallReport::Completed(outcome) => write!(f, "{outcome}"),
            CallReport::Dropped { key, payload } => write!(f, "[DROPPED] {key} {payload}"),
            CallReport::TimedOut { key, payload } => write!(f, "[TIMEOUT] {key} {payload}"),
        }
    }
}

struct CompactReport<'a>(&'a Report);

impl Display for CompactReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for call in &self.0.calls {
            writeln!(f, "{}", CompactCall(call))?;
        }

        if self.0.metrics.is_empty() {
            return Ok(());
        }

        writeln!(f)?;
        writeln!(f, "Per-mall metrics")?;
        writeln!(f, "{}", "─".repeat(60))?;

        let sorted = self.0.metrics.sorted();
        let key_width = sorted
            .iter()
            .map(|metrics| metrics.key.as_str().len())
            .max()
            .unwrap_or(0)
            .max(8);

        for metrics in sorted {
            writeln!(
                f,
                "{:<width$} │ {}",
                metrics.key.as_str(),
                metrics.summary(),
                width = key_width
            )?;
        }
        Ok(())
    }
}

pub(crate) struct Compact;

impl Compact {
    pub(crate) const fn new() -> Self {
        Self
    }
}

impl ReportFormatter for Compact {
    fn format(&self, report: &Report) -> Result<String> {
        Ok(CompactReport(report).to_string())
    }
}
