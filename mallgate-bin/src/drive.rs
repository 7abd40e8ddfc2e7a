//! Routing a batch of calls through the gateway and collecting what became
//! of each of them.

use futures::future::join_all;
use log::warn;
use mallgate_lib::{CallOutcome, ErrorKind, Gateway, MallKey, PendingOutcome};
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;

use crate::parse::CallSpec;

/// What became of a single call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub(crate) enum CallReport {
    /// The worker delivered an outcome, which may still be a final 429
    Completed(CallOutcome),
    /// The mall's queue was full when the call arrived
    Dropped { key: MallKey, payload: String },
    /// No outcome arrived within the caller's timeout
    TimedOut { key: MallKey, payload: String },
}

impl CallReport {
    /// Whether the call completed with a success status
    pub(crate) fn is_success(&self) -> bool {
        matches!(self, CallReport::Completed(outcome) if outcome.is_success())
    }
}

/// Route every call in order, then wait for all outcomes.
///
/// Calls are admitted before any outcome is awaited, so each mall's queue
/// sees its calls in input order. Each outcome is awaited for at most
/// `wait`; reports come back in input order.
pub(crate) async fn drive(gateway: &Gateway, calls: Vec<CallSpec>, wait: Duration) -> Vec<CallReport> {
    let pending: Vec<_> = calls
        .into_iter()
        .map(|call| {
            let outcome = gateway.route(call.key, call.payload.clone());
            (call.payload, outcome)
        })
        .collect();

    join_all(
        pending
            .into_iter()
            .map(|(payload, outcome)| await_report(payload, outcome, wait)),
    )
    .await
}

async fn await_report(payload: String, pending: PendingOutcome, wait: Duration) -> CallReport {
    let key = pending.key().clone();
    match timeout(wait, pending).await {
        Ok(Ok(outcome)) => CallReport::Completed(outcome),
        Ok(Err(ErrorKind::RequestDropped(_))) => CallReport::Dropped { key, payload },
        Ok(Err(e)) => {
            warn!("Unexpected failure for mall {key}: {e}");
            CallReport::Dropped { key, payload }
        }
        Err(_) => {
            warn!(
                "No outcome for mall {key} payload={payload} within {}ms",
                wait.as_millis()
            );
            CallReport::TimedOut { key, payload }
        }
    }
}
