//! Pure-Rust reader for SPEC instrument data files.
//!
//! A SPEC file is plain text: file header blocks (`#F`, `#E`, `#D`, `#O`,
//! ...) followed by scans (`#S` plus scan header lines, numeric data rows
//! and optional `@A` detector spectra).  Opening a file builds a
//! [`ScanIndex`] in one pass; each [`Scan`] is parsed only when first
//! requested and cached afterwards.
//!
//! * **lines**: [`line`] classifies raw lines by key and scope.
//! * **blocks**: [`assembler`] finds file header and scan boundaries.
//! * **scans**: [`scan`] parses one block into header fields and a
//!   [`DataBlock`] of labelled rows.
//!
//! Problems inside one block become [`ParseIssue`]s on that block; only
//! I/O failures, empty files and unknown scans surface as [`SpecError`].

pub mod assembler;
pub mod config;
pub mod data;
pub mod error;
pub mod file;
pub mod header;
pub mod index;
pub mod line;
pub mod scan;

use std::path::Path;

pub use config::{McaLayout, ParseOptions};
pub use data::{Cell, DataBlock, DataRow, Value};
pub use error::{ParseError, ParseIssue, Result, SpecError};
pub use file::{FileInfo, FileSpec, ScanId, ScanListing, Scans};
pub use header::{
    Calibration, ChannelRange, CountTime, CountTimes, ExtraLine, FileHeader, Roi, ScanHeader,
    SpecDate,
};
pub use index::{NumberLookup, ScanEntry, ScanIndex};
pub use scan::{Scan, ScanStatus, ScanSummary, ScanWarning};

/// Open and index a SPEC file with default [`ParseOptions`].
pub fn open(path: impl AsRef<Path>) -> Result<FileSpec> {
    FileSpec::open(path)
}
