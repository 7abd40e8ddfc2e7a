use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ErrorKind, Result};

/// Identifies the shard (a "mall") that scopes queueing, pacing,
/// congestion and metrics.
///
/// Keys are compared verbatim; two keys that differ only in case are
/// different malls.
///
/// # Examples
///
/// ```
/// use mallgate_lib::MallKey;
///
/// let key: MallKey = "mall-a".parse().unwrap();
/// assert_eq!(key.as_str(), "mall-a");
/// assert_eq!(key.worker_name(), "mall-mall-a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MallKey(String);

impl MallKey {
    /// Create a key, rejecting empty or whitespace-only input
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EmptyMallKey`] if `key` has no visible characters
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ErrorKind::EmptyMallKey);
        }
        Ok(MallKey(key))
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the key as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Stable, log-friendly name of the worker serving this mall.
    /// Characters outside `[A-Za-z0-9_-]` are replaced by `_`.
    #[must_use]
    pub fn worker_name(&self) -> String {
        let sanitized: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("mall-{sanitized}")
    }
}

impl FromStr for MallKey {
    type Err = ErrorKind;

    fn from_str(key: &str) -> Result<Self> {
        MallKey::new(key)
    }
}

impl fmt::Display for MallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MallKey {
    /// Infallible conversion for call sites that already hold a valid key,
    /// such as tests and configuration tables. Prefer [`MallKey::new`] for
    /// untrusted input.
    fn from(key: &str) -> Self {
        MallKey(key.to_string())
    }
}

impl From<String> for MallKey {
    fn from(key: String) -> Self {
        MallKey(key)
    }
}
