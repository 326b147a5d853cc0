//! Scan materialization: header fields, data rows and `@A` spectra of one
//! scan block, parsed on demand.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ParseOptions;
use crate::data::{ColumnLayout, DataBlock, DataRow, DataRowParser, SpectrumReader, Value};
use crate::error::{ParseError, ParseIssue};
use crate::header::{FileHeader, Roi, ScanHeader, SpecDate, parse_field};
use crate::index::{ScanEntry, scan_label};
use crate::line::{LineClassifier, LineKind, raw_lines};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Complete,
    /// Some lines failed; everything else was kept.
    Partial,
    /// The `#S` line itself could not be read.
    Unparseable,
}

/// Recoverable oddities that do not lose data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanWarning {
    /// `#N` disagrees with the number of `#L` labels.
    LabelCountMismatch { declared: usize, labels: usize },
    /// Values past the end of the layout were dropped.
    SurplusValues { line: usize, dropped: usize },
    /// `#P` values but no motor names to pair them with.
    MissingMotorNames,
    MotorPositionMismatch { names: usize, positions: usize },
}

/// One acquisition: its header, the file header in force, and its data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scan {
    pub position: usize,
    pub order: usize,
    pub header: ScanHeader,
    pub file_header: Option<Arc<FileHeader>>,
    pub data: DataBlock,
    pub status: ScanStatus,
    pub issues: Vec<ParseIssue>,
    pub warnings: Vec<ScanWarning>,
}

impl Scan {
    /// Parse the scan block at `entry.span` in `text`.
    pub fn parse(
        entry: &ScanEntry,
        text: &str,
        file_header: Option<Arc<FileHeader>>,
        options: &ParseOptions,
    ) -> Self {
        let mut builder = ScanBuilder::new(options);
        let body = &text[entry.span.clone()];
        for raw in raw_lines(body, entry.span.start, entry.first_line) {
            builder.line(raw.number, raw.text);
        }
        let scan = builder.finish(entry, file_header);
        debug!(
            scan = %entry.label(),
            points = scan.data.len(),
            status = ?scan.status,
            "scan parsed"
        );
        scan
    }

    //  Query interface

    pub fn header(&self) -> &ScanHeader {
        &self.header
    }

    pub fn data(&self) -> &DataBlock {
        &self.data
    }

    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_deref()
    }

    pub fn number(&self) -> Option<u32> {
        self.header.number
    }

    pub fn command(&self) -> &str {
        &self.header.command
    }

    pub fn is_complete(&self) -> bool {
        self.status == ScanStatus::Complete
    }

    /// `<number> <command>`, or `<number>.<order> <command>` for repeats.
    pub fn label(&self) -> String {
        scan_label(self.header.number, self.order, &self.header.command)
    }

    //  Names inherited from the file header

    pub fn motor_names(&self) -> &[String] {
        self.inherited(&self.header.motor_names, |h| &h.motor_names)
    }

    pub fn motor_mnemonics(&self) -> &[String] {
        self.inherited(&self.header.motor_mnemonics, |h| &h.motor_mnemonics)
    }

    pub fn counter_names(&self) -> &[String] {
        self.inherited(&self.header.counter_names, |h| &h.counter_names)
    }

    pub fn counter_mnemonics(&self) -> &[String] {
        self.inherited(&self.header.counter_mnemonics, |h| &h.counter_mnemonics)
    }

    fn inherited<'a>(
        &'a self,
        local: &'a [String],
        from_file: impl Fn(&'a FileHeader) -> &'a Vec<String>,
    ) -> &'a [String] {
        if !local.is_empty() {
            return local;
        }
        self.file_header
            .as_deref()
            .map(|h| from_file(h).as_slice())
            .unwrap_or_default()
    }

    /// Motor names paired with their `#P` positions.  `None` when the
    /// counts disagree.
    pub fn motor_positions(&self) -> Option<Vec<(&str, f64)>> {
        let names = self.motor_names();
        if names.is_empty() || names.len() != self.header.positions.len() {
            return None;
        }
        Some(
            names
                .iter()
                .map(String::as_str)
                .zip(self.header.positions.iter().copied())
                .collect(),
        )
    }

    pub fn user(&self) -> Option<&str> {
        self.file_header.as_deref()?.user.as_deref()
    }

    pub fn application(&self) -> Option<&str> {
        self.file_header.as_deref()?.application.as_deref()
    }

    /// File name recorded on the `#F` line.
    pub fn source(&self) -> Option<&str> {
        self.file_header.as_deref()?.source.as_deref()
    }

    pub fn file_epoch(&self) -> Option<i64> {
        self.file_header.as_deref()?.epoch
    }

    pub fn file_date(&self) -> Option<&SpecDate> {
        self.file_header.as_deref()?.date.as_ref()
    }

    //  Detector data

    /// Number of spectra across all rows.
    pub fn spectrum_count(&self) -> usize {
        self.data.rows.iter().map(|r| r.series().count()).sum()
    }

    /// Sum of the ROI window of its detector's spectrum, one per row.
    /// `roi.detector` is 0-based: detector 1 (`#@ROI ... mca1`) reads the
    /// `MCA1` column.  Rows without that spectrum yield 0.
    pub fn roi_counts(&self, roi: &Roi) -> Vec<f64> {
        let label = crate::data::detector_label(roi.detector);
        self.data
            .rows
            .iter()
            .map(|row| match row.get(&label) {
                Some(Value::Series(samples))
                    if roi.start <= roi.end && roi.start < samples.len() =>
                {
                    samples[roi.start..=roi.end.min(samples.len() - 1)]
                        .iter()
                        .sum::<f64>()
                }
                _ => 0.0,
            })
            .collect()
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            number: self.header.number,
            order: self.order,
            position: self.position,
            command: self.header.command.clone(),
            date: self.header.date.as_ref().map(|d| d.raw.clone()),
            points: self.data.len(),
            columns: self.data.labels.clone(),
            motors: self
                .motor_positions()
                .map(|m| m.into_iter().map(|(n, p)| (n.to_string(), p)).collect()),
            comments: self.header.comments.clone(),
            geometry: self.header.geometry.clone(),
            user: self.user().map(String::from),
            application: self.application().map(String::from),
            source: self.source().map(String::from),
            status: self.status,
            issues: self.issues.iter().map(ToString::to_string).collect(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Flat, serializable overview of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    pub number: Option<u32>,
    pub order: usize,
    pub position: usize,
    pub command: String,
    pub date: Option<String>,
    pub points: usize,
    pub columns: Vec<String>,
    pub motors: Option<Vec<(String, f64)>>,
    pub comments: Vec<String>,
    pub geometry: Vec<Vec<f64>>,
    pub user: Option<String>,
    pub application: Option<String>,
    pub source: Option<String>,
    pub status: ScanStatus,
    pub issues: Vec<String>,
    pub warnings: Vec<ScanWarning>,
}

//  Builder

/// Parser state for one scan block: the header filled so far, the open
/// data block and any row or spectrum still being read.
struct ScanBuilder<'o> {
    options: &'o ParseOptions,
    classifier: LineClassifier,
    header: ScanHeader,
    rows: Option<DataRowParser>,
    spectrum: SpectrumReader,
    data: DataBlock,
    issues: Vec<ParseIssue>,
    warnings: Vec<ScanWarning>,
    bad_scan_line: bool,
}

impl<'o> ScanBuilder<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            options,
            classifier: LineClassifier::new(),
            header: ScanHeader::default(),
            rows: None,
            spectrum: SpectrumReader::new(options.mca_layout),
            data: DataBlock::default(),
            issues: Vec::new(),
            warnings: Vec::new(),
            bad_scan_line: false,
        }
    }

    fn line(&mut self, number: usize, text: &str) {
        match self.classifier.classify(text) {
            LineKind::ScanHeaderKey(key) | LineKind::FileHeaderKey(key) => {
                self.close_pending();
                match parse_field(&key) {
                    Ok(field) => self.header.apply(field),
                    Err(error) => {
                        if matches!(error, ParseError::BadScanLine { .. }) {
                            self.bad_scan_line = true;
                            self.header.command = key.rest.to_string();
                        }
                        self.issue(ParseIssue {
                            line: number,
                            error,
                        });
                    }
                }
            }
            LineKind::Data(body) | LineKind::Text(body) => {
                if self.spectrum.is_open() {
                    self.spectrum_line(number, body);
                } else {
                    self.data_line(number, body);
                }
            }
            LineKind::Mca(body) => {
                self.flush_rows();
                self.spectrum_line(number, body);
            }
            LineKind::Blank => {}
        }
    }

    fn data_line(&mut self, number: usize, body: &str) {
        let header = &self.header;
        let options = self.options;
        let rows = self.rows.get_or_insert_with(|| {
            let layout = ColumnLayout::from_header(header);
            DataRowParser::new(layout, options)
        });
        if self.data.labels.is_empty() {
            self.data.labels = rows.layout().scalar_labels();
        }
        for settled in rows.feed(number, body) {
            match settled {
                Ok(parsed) => {
                    if parsed.surplus > 0 {
                        self.warnings.push(ScanWarning::SurplusValues {
                            line: parsed.line,
                            dropped: parsed.surplus,
                        });
                    }
                    self.push_row(parsed.row);
                }
                Err(issue) => self.issue(issue),
            }
        }
    }

    fn push_row(&mut self, row: DataRow) {
        for (label, _) in row.series() {
            if !self.data.labels.iter().any(|l| l == label) {
                self.data.labels.push(label.to_string());
            }
        }
        self.data.rows.push(row);
    }

    fn spectrum_line(&mut self, number: usize, body: &str) {
        match self.spectrum.feed(number, body) {
            Ok(Some(samples)) => self.attach_spectrum(number, samples),
            Ok(None) => {}
            Err(issue) => self.issue(issue),
        }
    }

    fn attach_spectrum(&mut self, line: usize, samples: Vec<f64>) {
        if let Some(expected) = self.header.extra.channel_count()
            && samples.len() != expected
        {
            self.issue(ParseIssue {
                line,
                error: ParseError::ColumnCountMismatch {
                    expected,
                    found: samples.len(),
                },
            });
            return;
        }
        let Some(row) = self.data.rows.last_mut() else {
            self.issue(ParseIssue {
                line,
                error: ParseError::DataWithoutScan,
            });
            return;
        };
        let label = row.push_series(samples);
        if !self.data.labels.contains(&label) {
            self.data.labels.push(label);
        }
    }

    fn flush_rows(&mut self) {
        let flushed = self.rows.as_mut().map(DataRowParser::flush);
        if let Some(Err(issue)) = flushed {
            self.issue(issue);
        }
    }

    fn close_pending(&mut self) {
        self.flush_rows();
        if let Some((line, samples)) = self.spectrum.finish() {
            self.attach_spectrum(line, samples);
        }
    }

    fn issue(&mut self, issue: ParseIssue) {
        warn!(line = issue.line, "{}", issue.error);
        self.issues.push(issue);
    }

    fn finish(mut self, entry: &ScanEntry, file_header: Option<Arc<FileHeader>>) -> Scan {
        self.close_pending();

        if let Some(declared) = self.header.columns
            && !self.header.labels.is_empty()
            && self.header.labels.len() != declared
        {
            self.warnings.push(ScanWarning::LabelCountMismatch {
                declared,
                labels: self.header.labels.len(),
            });
        }
        if self.data.labels.is_empty() {
            self.data.labels = ColumnLayout::from_header(&self.header).scalar_labels();
        }

        let status = if self.bad_scan_line {
            ScanStatus::Unparseable
        } else if self.issues.is_empty() {
            ScanStatus::Complete
        } else {
            ScanStatus::Partial
        };
        let mut scan = Scan {
            position: entry.position,
            order: entry.order,
            header: self.header,
            file_header,
            data: self.data,
            status,
            issues: self.issues,
            warnings: self.warnings,
        };

        let names = scan.motor_names().len();
        let positions = scan.header.positions.len();
        if positions > 0 && names == 0 {
            scan.warnings.push(ScanWarning::MissingMotorNames);
        } else if positions > 0 && names != positions {
            scan.warnings
                .push(ScanWarning::MotorPositionMismatch { names, positions });
        }
        scan
    }
}
