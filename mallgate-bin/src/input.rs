//! Reading calls for `--input`, one `MALL:PAYLOAD` per line.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::parse::CallSpec;

/// Comment marker for ignoring lines in input files
const COMMENT_MARKER: &str = "#";

/// Calls read from a file or stdin, in file order
#[derive(Debug, Clone)]
pub(crate) struct CallInput {
    pub(crate) calls: Vec<CallSpec>,
}

impl CallInput {
    /// Read calls from any reader, skipping blank lines and comments
    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut calls = Vec::new();
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.context("Cannot read lines from input")?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
                continue;
            }
            let call = line
                .trim_start()
                .parse()
                .with_context(|| format!("Invalid input on line {}", index + 1))?;
            calls.push(call);
        }
        Ok(CallInput { calls })
    }
}

impl TryFrom<&Path> for CallInput {
    type Error = anyhow::Error;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        if path == Path::new("-") {
            Self::from_reader(std::io::stdin())
        } else {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Cannot open --input file: {}", path.display()))?;
            Self::from_reader(file)
        }
    }
}
