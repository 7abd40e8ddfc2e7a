use thiserror::Error;

use crate::MallKey;

/// Possible errors when interacting with `mallgate_lib`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A mall key was empty or consisted only of whitespace
    #[error("Mall key must not be empty")]
    EmptyMallKey,

    /// The request never produced an outcome.
    /// This happens when the worker queue for the mall was full at admission
    /// time (the newest request is dropped) or the worker stopped.
    #[error("Request for mall `{0}` was dropped before an outcome was produced")]
    RequestDropped(MallKey),

    /// The gateway configuration is not usable
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfig(String),
}
