use std::time::Instant;

use tokio::sync::oneshot;

use crate::{CallOutcome, MallKey, PendingOutcome};

/// A single call addressed to a mall.
///
/// Created by the [`crate::Gateway`] and handed over to the worker of its
/// mall. The reply channel is consumed when the worker delivers the outcome,
/// so a request can yield at most one [`CallOutcome`].
#[derive(Debug)]
pub struct CallRequest {
    /// The mall this call is addressed to
    pub key: MallKey,
    /// Opaque payload forwarded to the downstream dependency
    pub payload: String,
    pub(crate) reply: oneshot::Sender<CallOutcome>,
}

impl CallRequest {
    /// Create a request together with the handle its caller awaits
    #[must_use]
    pub fn new(key: MallKey, payload: impl Into<String>) -> (Self, PendingOutcome) {
        let (reply, receiver) = oneshot::channel();
        let pending = PendingOutcome::new(key.clone(), receiver);
        let request = CallRequest {
            key,
            payload: payload.into(),
            reply,
        };
        (request, pending)
    }

    /// Deliver the terminal outcome to the caller.
    ///
    /// Returns `false` if the caller stopped waiting.
    pub(crate) fn reply(self, outcome: CallOutcome) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

/// A request sitting in a worker queue, stamped with its admission time
#[derive(Debug)]
pub struct QueuedEnvelope {
    /// The admitted request
    pub request: CallRequest,
    /// When the request was admitted; queue delay is measured from here
    pub enqueued_at: Instant,
}

impl QueuedEnvelope {
    /// Wrap a request, stamping it with the current time
    #[must_use]
    pub fn admit(request: CallRequest) -> Self {
        Self {
            request,
            enqueued_at: Instant::now(),
        }
    }

    /// Milliseconds elapsed since admission
    #[must_use]
    pub fn queue_delay_ms(&self) -> u64 {
        u64::try_from(self.enqueued_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
