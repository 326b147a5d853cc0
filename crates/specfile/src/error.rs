//! Error taxonomy.
//!
//! [`SpecError`] is fatal and surfaces from [`FileSpec`](crate::FileSpec)
//! calls.  [`ParseError`] is local to one block: it is recorded as a
//! [`ParseIssue`] on the scan or file header where it happened and never
//! aborts the rest of the file.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File '{0}' is empty")]
    EmptyFile(String),

    #[error("Scan {0} not found")]
    NotFound(String),

    #[error("Invalid scan id '{0}', expected <number> or <number>.<order>")]
    InvalidScanId(String),
}

pub type Result<T> = std::result::Result<T, SpecError>;

/// Errors confined to a single scan or header block.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseError {
    #[error("data line found before any scan header")]
    DataWithoutScan,

    #[error("malformed #{key} line: {reason}")]
    MalformedHeaderField { key: String, reason: String },

    #[error("expected {expected} values, found {found}")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("non-numeric token '{token}'")]
    NonNumericToken { token: String },

    #[error("cannot read scan number from '{text}'")]
    BadScanLine { text: String },
}

impl ParseError {
    pub(crate) fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedHeaderField {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// A [`ParseError`] pinned to the (1-based) file line that caused it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseIssue {
    pub line: usize,
    pub error: ParseError,
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}
