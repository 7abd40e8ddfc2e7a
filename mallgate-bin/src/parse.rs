use anyhow::{Context, Result, anyhow};
use mallgate_lib::MallKey;
use std::str::FromStr;

/// Separates the mall key from the payload in `MALL:PAYLOAD`
const CALL_SEPARATOR: char = ':';

/// A call given on the command line or in an input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallSpec {
    pub(crate) key: MallKey,
    pub(crate) payload: String,
}

impl FromStr for CallSpec {
    type Err = anyhow::Error;

    /// Parse `MALL:PAYLOAD`. Only the first `:` separates; the payload may
    /// contain more colons and may be empty.
    fn from_str(call: &str) -> Result<Self> {
        let (key, payload) = call
            .split_once(CALL_SEPARATOR)
            .ok_or_else(|| anyhow!("Invalid call `{call}`, expected `MALL:PAYLOAD`"))?;
        let key = MallKey::new(key.trim())
            .with_context(|| format!("Invalid call `{call}`"))?;
        Ok(CallSpec {
            key,
            payload: payload.to_string(),
        })
    }
}
