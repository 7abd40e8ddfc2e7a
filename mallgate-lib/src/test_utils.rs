//! Doubles for the [`Downstream`] seam, shared by the unit tests.

use async_trait::async_trait;
use http::StatusCode;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::MallKey;
use crate::downstream::{Attempt, Downstream};

/// A successful attempt with the given bucket usage, echoing `payload`
pub(crate) fn accepted(payload: &str, used: u32, max: u32) -> Attempt {
    Attempt {
        status: StatusCode::OK,
        body: Some(payload.to_string()),
        bucket_used: used,
        bucket_max: max,
        retry_after: Duration::ZERO,
    }
}

/// A congestion rejection asking for `retry_after`
pub(crate) fn rejected(retry_after: Duration) -> Attempt {
    Attempt {
        status: StatusCode::TOO_MANY_REQUESTS,
        body: None,
        bucket_used: 11,
        bucket_max: 10,
        retry_after,
    }
}

/// Answers with a fixed script of attempts, then with a fallback forever.
/// A fallback of `None` echoes the payload with an empty bucket.
#[derive(Debug, Default)]
pub(crate) struct Scripted {
    script: Mutex<VecDeque<Attempt>>,
    fallback: Option<Attempt>,
    calls: AtomicU32,
}

impl Scripted {
    pub(crate) fn echo() -> Self {
        Self::default()
    }

    pub(crate) fn always(attempt: Attempt) -> Self {
        Self {
            fallback: Some(attempt),
            ..Self::default()
        }
    }

    pub(crate) fn then_echo(script: Vec<Attempt>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downstream for Scripted {
    async fn call(&self, _key: &MallKey, payload: &str) -> Attempt {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .unwrap_or_else(|| accepted(payload, 0, 10))
    }
}

/// Blocks every call until [`Gated::open`] hands out permits.
/// `started` is notified whenever a call begins.
#[derive(Debug)]
pub(crate) struct Gated {
    pub(crate) started: Notify,
    permits: Semaphore,
}

impl Gated {
    pub(crate) fn closed() -> Self {
        Self {
            started: Notify::new(),
            permits: Semaphore::new(0),
        }
    }

    pub(crate) fn open(&self, calls: usize) {
        self.permits.add_permits(calls);
    }
}

#[async_trait]
impl Downstream for Gated {
    async fn call(&self, _key: &MallKey, payload: &str) -> Attempt {
        self.started.notify_one();
        self.permits.acquire().await.unwrap().forget();
        accepted(payload, 0, 10)
    }
}
