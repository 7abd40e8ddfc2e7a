use std::fmt::{self, Display};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::StatusCode;
use serde::{Serialize, Serializer};
use tokio::sync::oneshot;

use crate::downstream::Attempt;
use crate::{ErrorKind, MallKey, Result};

/// Terminal result of processing one request.
///
/// Produced once per request, after any retries, and never mutated
/// afterwards. A final 429 means the retries were exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallOutcome {
    /// The mall the call was addressed to
    pub key: MallKey,
    /// The payload that was sent
    pub payload: String,
    /// Body returned by the dependency, absent for rejections
    pub result: Option<String>,
    /// Status of the last attempt
    #[serde(rename = "status_code", serialize_with = "serialize_status")]
    pub status: StatusCode,
    /// Bucket level reported by the last attempt
    pub bucket_used: u32,
    /// Bucket capacity reported by the last attempt
    pub bucket_max: u32,
}

impl CallOutcome {
    pub(crate) fn from_attempt(key: MallKey, payload: String, attempt: Attempt) -> Self {
        Self {
            key,
            payload,
            result: attempt.body,
            status: attempt.status,
            bucket_used: attempt.bucket_used,
            bucket_max: attempt.bucket_max,
        }
    }

    /// Whether the dependency accepted the call
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} -> {} (bucket {}/{})",
            self.status.as_u16(),
            self.key,
            self.payload,
            self.result.as_deref().unwrap_or("-"),
            self.bucket_used,
            self.bucket_max
        )
    }
}

fn serialize_status<S>(status: &StatusCode, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u16(status.as_u16())
}

/// Handle to an outcome that the mall's worker delivers later.
///
/// Resolves to [`ErrorKind::RequestDropped`] if the request was dropped at
/// admission, because its reply channel closes without a value.
#[derive(Debug)]
pub struct PendingOutcome {
    key: MallKey,
    receiver: oneshot::Receiver<CallOutcome>,
}

impl PendingOutcome {
    pub(crate) const fn new(key: MallKey, receiver: oneshot::Receiver<CallOutcome>) -> Self {
        Self { key, receiver }
    }

    /// The mall this outcome belongs to
    #[must_use]
    pub const fn key(&self) -> &MallKey {
        &self.key
    }
}

impl Future for PendingOutcome {
    type Output = Result<CallOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.receiver)
            .poll(cx)
            .map(|received| received.map_err(|_| ErrorKind::RequestDropped(this.key.clone())))
    }
}
