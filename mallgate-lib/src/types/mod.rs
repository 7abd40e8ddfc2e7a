#![allow(unreachable_pub)]

mod error;
mod key;
mod outcome;
mod request;

pub use error::ErrorKind;
pub use key::MallKey;
pub use outcome::{CallOutcome, PendingOutcome};
pub use request::{CallRequest, QueuedEnvelope};

/// The mallgate `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
