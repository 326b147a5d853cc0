//! Data rows: scalar counter columns, optionally followed by one spectrum
//! per 1D detector.

use serde::Serialize;

use crate::config::{McaLayout, ParseOptions};
use crate::error::{ParseError, ParseIssue};
use crate::header::ScanHeader;

//  Values

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(f64),
    Series(Vec<f64>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Series(_) => None,
        }
    }

    pub fn as_series(&self) -> Option<&[f64]> {
        match self {
            Self::Series(v) => Some(v),
            Self::Scalar(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub label: String,
    pub value: Value,
}

/// One acquisition point, columns in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataRow {
    cells: Vec<Cell>,
}

impl DataRow {
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|c| c.label == label)
            .map(|c| &c.value)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Scalar values in column order.
    pub fn scalars(&self) -> Vec<f64> {
        self.cells.iter().filter_map(|c| c.value.as_scalar()).collect()
    }

    pub fn series(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.cells
            .iter()
            .filter_map(|c| c.value.as_series().map(|s| (c.label.as_str(), s)))
    }

    fn push(&mut self, label: String, value: Value) {
        self.cells.push(Cell { label, value });
    }

    /// Attach a spectrum as the next detector column.
    pub(crate) fn push_series(&mut self, samples: Vec<f64>) -> String {
        let label = detector_label(self.series().count());
        self.push(label.clone(), Value::Series(samples));
        label
    }
}

/// Rows of one scan in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataBlock {
    /// Scalar labels followed by detector labels.
    pub labels: Vec<String>,
    pub rows: Vec<DataRow>,
}

impl DataBlock {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a scalar column, one per row that has it.
    pub fn column(&self, label: &str) -> Option<Vec<f64>> {
        if !self.labels.iter().any(|l| l == label) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .filter_map(|r| r.get(label).and_then(Value::as_scalar))
                .collect(),
        )
    }
}

/// Column name of the `index`-th detector spectrum in a row.
pub fn detector_label(index: usize) -> String {
    format!("MCA{index}")
}

//  Layout

/// What a data row of a given scan is expected to contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Scalar labels. Empty when the scan declares none: rows then define
    /// their own width.
    pub labels: Vec<String>,
    /// Detector spectra carried inline on the data line.
    pub detectors: usize,
    /// Samples per spectrum, when declared.
    pub channels: Option<usize>,
}

impl ColumnLayout {
    pub fn from_header(header: &ScanHeader) -> Self {
        // With `#@MCA` the spectra come on `@A` lines, not inline.
        let detectors = if header.extra.mca_format().is_some() {
            0
        } else {
            header.extra.detector_count()
        };
        Self {
            labels: header.resolved_labels(),
            detectors,
            channels: header.extra.channel_count(),
        }
    }

    /// Scalar column labels.  Detector labels are added per row, from the
    /// series the row actually holds.
    pub fn scalar_labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    /// Number of values a complete row needs, when that is known up front.
    /// `None` also when the declared size does not fit in `usize`.
    fn wanted(&self) -> Option<usize> {
        if self.labels.is_empty() {
            return None;
        }
        match (self.detectors, self.channels) {
            (0, _) => Some(self.labels.len()),
            (d, Some(c)) => d.checked_mul(c)?.checked_add(self.labels.len()),
            (_, None) => None,
        }
    }

    /// Split a complete run of values into a row.  Returns the row and the
    /// number of surplus values left over.
    fn build(&self, values: &[f64]) -> Result<(DataRow, usize), ParseError> {
        let d = self.detectors;
        let k = if self.labels.is_empty() {
            match self.channels {
                Some(c) if d > 0 => d
                    .checked_mul(c)
                    .map_or(0, |n| values.len().saturating_sub(n)),
                _ => values.len(),
            }
        } else {
            self.labels.len()
        };
        if values.len() < k {
            return Err(ParseError::ColumnCountMismatch {
                expected: self.wanted().unwrap_or(k),
                found: values.len(),
            });
        }

        let mut row = DataRow::default();
        for (i, v) in values[..k].iter().enumerate() {
            let label = self
                .labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("col{i}"));
            row.push(label, Value::Scalar(*v));
        }

        let rest = &values[k..];
        if d == 0 {
            return Ok((row, rest.len()));
        }
        let channels = match self.channels {
            Some(c) => c,
            None if !rest.is_empty() && rest.len() % d == 0 => rest.len() / d,
            None => {
                return Err(ParseError::ColumnCountMismatch {
                    expected: d
                        .saturating_mul(rest.len().div_ceil(d).max(1))
                        .saturating_add(k),
                    found: values.len(),
                });
            }
        };
        let Some(span) = d.checked_mul(channels).filter(|n| *n <= rest.len()) else {
            return Err(ParseError::ColumnCountMismatch {
                expected: d.saturating_mul(channels).saturating_add(k),
                found: values.len(),
            });
        };
        for i in 0..d {
            row.push_series(rest[i * channels..(i + 1) * channels].to_vec());
        }
        Ok((row, rest.len() - span))
    }
}

//  Row parser

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// Line where the row starts.
    pub line: usize,
    pub row: DataRow,
    /// Values dropped past the end of the layout.
    pub surplus: usize,
}

#[derive(Debug)]
struct Pending {
    line: usize,
    values: Vec<f64>,
}

/// Turns data lines into rows for one scan's layout.
#[derive(Debug)]
pub struct DataRowParser {
    layout: ColumnLayout,
    mca_layout: McaLayout,
    strict: bool,
    pending: Option<Pending>,
}

impl DataRowParser {
    pub fn new(layout: ColumnLayout, options: &ParseOptions) -> Self {
        Self {
            layout,
            mca_layout: options.mca_layout,
            strict: options.strict_columns,
            pending: None,
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// A row is waiting for continuation lines.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Parse one self-contained data line.
    pub fn parse_line(&self, text: &str) -> Result<(DataRow, usize), ParseError> {
        let values = tokenize(text)?;
        self.layout.build(&values)
    }

    /// Feed the next data line.  Returns the rows and issues it settles, in
    /// line order; under [`McaLayout::Continuation`] a short line waits for
    /// more and nothing is returned yet.
    ///
    /// A continuation line may only supply what the pending row still
    /// lacks.  A line that would overshoot it closes the pending row as a
    /// [`ParseError::ColumnCountMismatch`] and starts a row of its own.
    pub fn feed(&mut self, line: usize, text: &str) -> Vec<Result<ParsedRow, ParseIssue>> {
        let mut settled = Vec::new();
        let fresh = match tokenize(text) {
            Ok(values) => values,
            Err(error) => {
                if let Err(issue) = self.flush() {
                    settled.push(Err(issue));
                }
                settled.push(Err(ParseIssue { line, error }));
                return settled;
            }
        };

        let wanted = self.continuation_width();
        let (start, values) = match self.pending.take() {
            Some(mut p) if wanted.is_some_and(|w| p.values.len() + fresh.len() <= w) => {
                p.values.extend(fresh);
                (p.line, p.values)
            }
            Some(p) => {
                settled.push(Err(self.short_row(p)));
                (line, fresh)
            }
            None => (line, fresh),
        };

        if let Some(wanted) = wanted
            && values.len() < wanted
        {
            self.pending = Some(Pending {
                line: start,
                values,
            });
            return settled;
        }
        settled.push(self.complete(start, &values));
        settled
    }

    /// Give up on a row still waiting for continuation lines.
    pub fn flush(&mut self) -> Result<(), ParseIssue> {
        match self.pending.take() {
            Some(p) => Err(self.short_row(p)),
            None => Ok(()),
        }
    }

    /// Row width to wait for when a short row may continue on later lines.
    fn continuation_width(&self) -> Option<usize> {
        if self.mca_layout == McaLayout::Continuation && self.layout.detectors > 0 {
            self.layout.wanted()
        } else {
            None
        }
    }

    fn short_row(&self, p: Pending) -> ParseIssue {
        ParseIssue {
            line: p.line,
            error: ParseError::ColumnCountMismatch {
                expected: self.layout.wanted().unwrap_or(p.values.len()),
                found: p.values.len(),
            },
        }
    }

    fn complete(&self, start: usize, values: &[f64]) -> Result<ParsedRow, ParseIssue> {
        let issue = |error| ParseIssue { line: start, error };
        let (row, surplus) = self.layout.build(values).map_err(issue)?;
        if surplus > 0 && self.strict {
            return Err(issue(ParseError::ColumnCountMismatch {
                expected: values.len() - surplus,
                found: values.len(),
            }));
        }
        Ok(ParsedRow {
            line: start,
            row,
            surplus,
        })
    }
}

/// Split on whitespace runs and parse every token as a number.
pub fn tokenize(text: &str) -> Result<Vec<f64>, ParseError> {
    text.split_whitespace()
        .map(|t| {
            t.parse::<f64>().map_err(|_| ParseError::NonNumericToken {
                token: t.to_string(),
            })
        })
        .collect()
}

//  `@A` spectra

/// Collects one `@A` spectrum, following `\` continuations.
#[derive(Debug)]
pub struct SpectrumReader {
    mca_layout: McaLayout,
    line: usize,
    values: Vec<f64>,
    open: bool,
}

impl SpectrumReader {
    pub fn new(mca_layout: McaLayout) -> Self {
        Self {
            mca_layout,
            line: 0,
            values: Vec::new(),
            open: false,
        }
    }

    /// The current spectrum expects a continuation line.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Feed an `@A` line (prefix stripped) or a continuation line.
    pub fn feed(&mut self, line: usize, text: &str) -> Result<Option<Vec<f64>>, ParseIssue> {
        if !self.open {
            self.line = line;
            self.values.clear();
        }
        let text = text.trim();
        let (body, continued) = match text.strip_suffix('\\') {
            Some(body) => (body, self.mca_layout == McaLayout::Continuation),
            None => (text, false),
        };
        let values = tokenize(body).map_err(|error| {
            self.open = false;
            ParseIssue { line, error }
        })?;
        self.values.extend(values);
        self.open = continued;
        if continued {
            Ok(None)
        } else {
            Ok(Some(std::mem::take(&mut self.values)))
        }
    }

    /// Close a spectrum cut short by the end of its block.
    pub fn finish(&mut self) -> Option<(usize, Vec<f64>)> {
        if !self.open {
            return None;
        }
        self.open = false;
        Some((self.line, std::mem::take(&mut self.values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(labels: &[&str], detectors: usize, channels: Option<usize>) -> ColumnLayout {
        ColumnLayout {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            detectors,
            channels,
        }
    }

    fn parser(layout: ColumnLayout, mca: McaLayout) -> DataRowParser {
        DataRowParser::new(layout, &ParseOptions::default().with_layout(mca))
    }

    #[test]
    fn scalar_row() {
        let p = parser(layout(&["Two_theta", "Counts"], 0, None), McaLayout::SingleLine);
        let (row, surplus) = p.parse_line("0.1   120").unwrap();
        assert_eq!(surplus, 0);
        assert_eq!(row.get("Two_theta"), Some(&Value::Scalar(0.1)));
        assert_eq!(row.get("Counts"), Some(&Value::Scalar(120.0)));
        assert_eq!(row.scalars(), vec![0.1, 120.0]);
    }

    #[test]
    fn detector_samples_expand_into_series() {
        let p = parser(layout(&["Two_theta", "Counts"], 1, Some(3)), McaLayout::SingleLine);
        let (row, _) = p.parse_line("0.0 100 5 6 7").unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("MCA0"), Some(&Value::Series(vec![5.0, 6.0, 7.0])));

        let p = parser(layout(&["x"], 2, Some(2)), McaLayout::SingleLine);
        let (row, _) = p.parse_line("1 10 11 20 21").unwrap();
        let series: Vec<_> = row.series().collect();
        assert_eq!(
            series,
            vec![("MCA0", &[10.0, 11.0][..]), ("MCA1", &[20.0, 21.0][..])]
        );
    }

    #[test]
    fn too_few_tokens() {
        let p = parser(layout(&["a", "b", "c"], 0, None), McaLayout::SingleLine);
        assert_eq!(
            p.parse_line("1 2").unwrap_err(),
            ParseError::ColumnCountMismatch {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn non_numeric_token() {
        let p = parser(layout(&["a", "b"], 0, None), McaLayout::SingleLine);
        assert_eq!(
            p.parse_line("1 x").unwrap_err(),
            ParseError::NonNumericToken { token: "x".into() }
        );
    }

    #[test]
    fn single_line_layout_rejects_split_spectrum() {
        let mut p = parser(layout(&["x"], 1, Some(4)), McaLayout::SingleLine);
        let settled = p.feed(10, "1 5 6");
        assert_eq!(settled.len(), 1);
        let err = settled[0].clone().unwrap_err();
        assert_eq!(err.line, 10);
        assert_eq!(
            err.error,
            ParseError::ColumnCountMismatch {
                expected: 5,
                found: 3
            }
        );
    }

    #[test]
    fn continuation_layout_joins_lines() {
        let mut p = parser(layout(&["x"], 1, Some(4)), McaLayout::Continuation);
        assert!(p.feed(10, "1 5 6").is_empty());
        assert!(p.is_pending());
        let settled = p.feed(11, "7 8");
        assert_eq!(settled.len(), 1);
        let parsed = settled[0].clone().unwrap();
        assert_eq!(parsed.line, 10);
        assert_eq!(
            parsed.row.get("MCA0"),
            Some(&Value::Series(vec![5.0, 6.0, 7.0, 8.0]))
        );
        assert!(p.flush().is_ok());
    }

    #[test]
    fn overshooting_line_starts_a_new_row() {
        let mut p = parser(layout(&["x"], 1, Some(3)), McaLayout::Continuation);
        assert!(p.feed(6, "1 5 6").is_empty());
        let settled = p.feed(7, "2 7 8 9");
        assert_eq!(settled.len(), 2);

        let err = settled[0].clone().unwrap_err();
        assert_eq!(err.line, 6);
        assert_eq!(
            err.error,
            ParseError::ColumnCountMismatch {
                expected: 4,
                found: 3
            }
        );

        let parsed = settled[1].clone().unwrap();
        assert_eq!(parsed.line, 7);
        assert_eq!(parsed.row.get("x"), Some(&Value::Scalar(2.0)));
        assert_eq!(
            parsed.row.get("MCA0"),
            Some(&Value::Series(vec![7.0, 8.0, 9.0]))
        );
        assert!(!p.is_pending());
    }

    #[test]
    fn overshooting_short_line_waits_again() {
        let mut p = parser(layout(&["x"], 1, Some(3)), McaLayout::Continuation);
        assert!(p.feed(1, "1 5 6").is_empty());
        let settled = p.feed(2, "2 7 8");
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].clone().unwrap_err().line, 1);
        assert!(p.is_pending());
        let parsed = p.feed(3, "9").remove(0).unwrap();
        assert_eq!(parsed.line, 2);
        assert_eq!(
            parsed.row.get("MCA0"),
            Some(&Value::Series(vec![7.0, 8.0, 9.0]))
        );
    }

    #[test]
    fn bad_token_closes_pending_row_first() {
        let mut p = parser(layout(&["x"], 1, Some(4)), McaLayout::Continuation);
        assert!(p.feed(4, "1 5").is_empty());
        let settled = p.feed(5, "6 oops");
        let lines: Vec<_> = settled.iter().map(|r| r.clone().unwrap_err().line).collect();
        assert_eq!(lines, vec![4, 5]);
        assert!(!p.is_pending());
    }

    #[test]
    fn unfinished_continuation_is_flushed_as_error() {
        let mut p = parser(layout(&["x"], 1, Some(4)), McaLayout::Continuation);
        assert!(p.feed(3, "1 5").is_empty());
        let err = p.flush().unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.error, ParseError::ColumnCountMismatch { .. }));
    }

    #[test]
    fn oversized_layout_is_a_mismatch() {
        let huge = 1usize << 48;
        for mca in [McaLayout::SingleLine, McaLayout::Continuation] {
            let mut p = parser(layout(&["x"], 1 << 16, Some(huge)), mca);
            let settled = p.feed(1, "1 2 3");
            assert_eq!(settled.len(), 1);
            assert_eq!(
                settled[0].clone().unwrap_err().error,
                ParseError::ColumnCountMismatch {
                    expected: usize::MAX,
                    found: 3
                }
            );
            assert!(!p.is_pending());
        }

        let p = parser(layout(&[], 1 << 16, Some(huge)), McaLayout::SingleLine);
        assert!(p.parse_line("1 2 3").is_err());
    }

    #[test]
    fn surplus_tokens_dropped_or_rejected() {
        let mut lenient = parser(layout(&["a"], 0, None), McaLayout::Continuation);
        let parsed = lenient.feed(1, "1 2 3").remove(0).unwrap();
        assert_eq!(parsed.surplus, 2);
        assert_eq!(parsed.row.scalars(), vec![1.0]);

        let mut strict = DataRowParser::new(
            layout(&["a"], 0, None),
            &ParseOptions::default().strict(true),
        );
        assert!(strict.feed(1, "1 2 3").remove(0).is_err());
    }

    #[test]
    fn unlabeled_rows_define_their_width() {
        let p = parser(ColumnLayout::default(), McaLayout::SingleLine);
        let (row, _) = p.parse_line("1 2 3").unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("col2"), Some(&Value::Scalar(3.0)));
    }

    #[test]
    fn spectrum_reader_follows_backslash() {
        let mut r = SpectrumReader::new(McaLayout::Continuation);
        assert_eq!(r.feed(1, "1 2 3\\").unwrap(), None);
        assert!(r.is_open());
        assert_eq!(r.feed(2, "4 5").unwrap(), Some(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
        assert!(!r.is_open());

        let mut r = SpectrumReader::new(McaLayout::SingleLine);
        assert_eq!(r.feed(1, "1 2 3\\").unwrap(), Some(vec![1.0, 2.0, 3.0]));

        let mut r = SpectrumReader::new(McaLayout::Continuation);
        assert_eq!(r.feed(7, "1 2\\").unwrap(), None);
        assert_eq!(r.finish(), Some((7, vec![1.0, 2.0])));
    }

    #[test]
    fn column_extraction() {
        let p = parser(layout(&["x", "y"], 0, None), McaLayout::SingleLine);
        let block = DataBlock {
            labels: vec!["x".into(), "y".into()],
            rows: vec![
                p.parse_line("1 10").unwrap().0,
                p.parse_line("2 20").unwrap().0,
            ],
        };
        assert_eq!(block.column("y"), Some(vec![10.0, 20.0]));
        assert_eq!(block.column("z"), None);
    }
}
