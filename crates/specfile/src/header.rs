//! Header field parsing and the file/scan header types.

use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{ParseError, ParseIssue};
use crate::line::{HeaderKey, KeyLine, LineClassifier, LineKind, raw_lines};

/// Date format written by SPEC, e.g. `Sat Jan 25 14:31:49 2014`.
const SPEC_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Largest `#@MCA_NB` accepted; more is treated as a corrupt header.
pub const MAX_DETECTORS: usize = 256;

//  Field values

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecDate {
    pub raw: String,
    pub parsed: Option<NaiveDateTime>,
}

impl SpecDate {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            raw: raw.to_string(),
            parsed: NaiveDateTime::parse_from_str(&normalized, SPEC_DATE_FORMAT).ok(),
        }
    }
}

/// `#T 1  (Seconds)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountTime {
    pub value: f64,
    pub units: String,
}

/// `#@CHANN total start end step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelRange {
    pub total: usize,
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl ChannelRange {
    /// Number of channels actually saved per spectrum.
    pub fn saved(&self) -> usize {
        if self.step > 0 && self.end >= self.start {
            ((self.end - self.start) / self.step).saturating_add(1)
        } else {
            self.total
        }
    }
}

/// `#@CTIME preset live real`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CountTimes {
    pub preset: f64,
    pub live: f64,
    pub real: f64,
}

/// `#@CALIB a b c`: energy = a + b·ch + c·ch²
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Calibration {
    pub fn energy(&self, channel: f64) -> f64 {
        self.a + self.b * channel + self.c * channel * channel
    }
}

/// Region of interest over one detector's channels (inclusive window).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roi {
    pub name: String,
    pub start: usize,
    pub end: usize,
    /// 0-based detector index, the `k` of the `MCA<k>` column.
    pub detector: usize,
}

/// Payload of a `#@<SUBKEY>` line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtraLine {
    /// `#@MCA 16C`: samples per `@A` line, `C` when spectra continue.
    McaFormat { per_line: usize, continued: bool },
    Channels(ChannelRange),
    CountTimes(CountTimes),
    Calibration(Calibration),
    DetectorCount { count: usize },
    DetectorName { index: usize, name: String },
    Roi(Roi),
    Unknown { subkey: String, text: String },
}

/// The `@` lines of one header, with typed lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtraLineSet {
    lines: Vec<ExtraLine>,
}

impl ExtraLineSet {
    pub fn push(&mut self, line: ExtraLine) {
        self.lines.push(line);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtraLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn mca_format(&self) -> Option<(usize, bool)> {
        self.lines.iter().find_map(|l| match l {
            ExtraLine::McaFormat {
                per_line,
                continued,
            } => Some((*per_line, *continued)),
            _ => None,
        })
    }

    pub fn channels(&self) -> Option<ChannelRange> {
        self.lines.iter().find_map(|l| match l {
            ExtraLine::Channels(r) => Some(*r),
            _ => None,
        })
    }

    pub fn channel_count(&self) -> Option<usize> {
        self.channels().map(|r| r.saved())
    }

    pub fn count_times(&self) -> Option<CountTimes> {
        self.lines.iter().find_map(|l| match l {
            ExtraLine::CountTimes(t) => Some(*t),
            _ => None,
        })
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.lines.iter().find_map(|l| match l {
            ExtraLine::Calibration(c) => Some(*c),
            _ => None,
        })
    }

    /// Declared number of 1D detectors per point (`#@MCA_NB`), 0 if absent.
    pub fn detector_count(&self) -> usize {
        self.lines
            .iter()
            .find_map(|l| match l {
                ExtraLine::DetectorCount { count } => Some(*count),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn detector_name(&self, index: usize) -> Option<&str> {
        self.lines.iter().find_map(|l| match l {
            ExtraLine::DetectorName { index: i, name } if *i == index => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn rois(&self) -> impl Iterator<Item = &Roi> {
        self.lines.iter().filter_map(|l| match l {
            ExtraLine::Roi(r) => Some(r),
            _ => None,
        })
    }
}

/// A header line with a key we keep but do not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownLine {
    pub key: String,
    pub text: String,
}

/// Typed content of one header line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HeaderField {
    Scan { number: u32, command: String },
    Epoch(i64),
    File(String),
    Date(SpecDate),
    Columns(usize),
    Labels(Vec<String>),
    MotorNames(Vec<String>),
    MotorMnemonics(Vec<String>),
    CounterNames(Vec<String>),
    CounterMnemonics(Vec<String>),
    User(String),
    Comment(String),
    Positions(Vec<f64>),
    Time(CountTime),
    Geometry(Vec<f64>),
    Q(Vec<f64>),
    Extra(ExtraLine),
    Unknown(UnknownLine),
}

//  Field parser

/// Parse the remainder of a header line according to its key.
pub fn parse_field(line: &KeyLine<'_>) -> Result<HeaderField, ParseError> {
    let rest = line.rest;
    let field = match line.key {
        HeaderKey::Scan => {
            let mut tokens = rest.split_whitespace();
            let number = tokens
                .next()
                .and_then(|t| t.parse::<u32>().ok())
                .ok_or_else(|| ParseError::BadScanLine {
                    text: rest.to_string(),
                })?;
            HeaderField::Scan {
                number,
                command: tokens.collect::<Vec<_>>().join(" "),
            }
        }
        HeaderKey::Epoch => HeaderField::Epoch(parse_epoch(rest).ok_or_else(|| {
            ParseError::malformed(line.label(), format!("'{rest}' is not an epoch"))
        })?),
        HeaderKey::File => HeaderField::File(rest.to_string()),
        HeaderKey::Date => HeaderField::Date(SpecDate::parse(rest)),
        HeaderKey::Columns => HeaderField::Columns(parse_single(line)?),
        HeaderKey::Labels => HeaderField::Labels(split_labels(rest)),
        HeaderKey::MotorNames => HeaderField::MotorNames(split_labels(rest)),
        HeaderKey::MotorMnemonics => HeaderField::MotorMnemonics(split_words(rest)),
        HeaderKey::CounterNames => HeaderField::CounterNames(split_labels(rest)),
        HeaderKey::CounterMnemonics => HeaderField::CounterMnemonics(split_words(rest)),
        HeaderKey::User => HeaderField::User(rest.to_string()),
        HeaderKey::Comment => HeaderField::Comment(rest.to_string()),
        HeaderKey::Positions => HeaderField::Positions(parse_numbers(line)?),
        HeaderKey::Time => HeaderField::Time(parse_count_time(line)?),
        HeaderKey::Geometry => HeaderField::Geometry(parse_numbers(line)?),
        HeaderKey::Q => HeaderField::Q(parse_numbers(line)?),
        HeaderKey::Extra => HeaderField::Extra(parse_extra(line)?),
        HeaderKey::Unknown(_) => HeaderField::Unknown(UnknownLine {
            key: line.label(),
            text: rest.to_string(),
        }),
    };
    Ok(field)
}

fn parse_extra(line: &KeyLine<'_>) -> Result<ExtraLine, ParseError> {
    let rest = line.rest;
    let extra = match line.suffix {
        "MCA" => {
            let spec = rest.split_whitespace().next().unwrap_or_default();
            let continued = spec.ends_with('C');
            let per_line = spec
                .trim_end_matches('C')
                .parse::<usize>()
                .map_err(|_| ParseError::malformed(line.label(), format!("bad format '{spec}'")))?;
            ExtraLine::McaFormat {
                per_line,
                continued,
            }
        }
        "CHANN" => {
            let [total, start, end, step] = parse_fixed::<usize, 4>(line)?;
            ExtraLine::Channels(ChannelRange {
                total,
                start,
                end,
                step,
            })
        }
        "CTIME" => {
            let [preset, live, real] = parse_fixed::<f64, 3>(line)?;
            ExtraLine::CountTimes(CountTimes { preset, live, real })
        }
        "CALIB" => {
            let [a, b, c] = parse_fixed::<f64, 3>(line)?;
            ExtraLine::Calibration(Calibration { a, b, c })
        }
        "MCA_NB" => {
            let count: usize = parse_single(line)?;
            if count > MAX_DETECTORS {
                return Err(ParseError::malformed(
                    line.label(),
                    format!("{count} detectors, at most {MAX_DETECTORS} supported"),
                ));
            }
            ExtraLine::DetectorCount { count }
        }
        "ROI" => parse_roi(line)?,
        other => match other.strip_prefix("DET_") {
            Some(index) => ExtraLine::DetectorName {
                index: index.parse().map_err(|_| {
                    ParseError::malformed(line.label(), format!("bad detector index '{index}'"))
                })?,
                name: rest.to_string(),
            },
            None => ExtraLine::Unknown {
                subkey: other.to_string(),
                text: rest.to_string(),
            },
        },
    };
    Ok(extra)
}

fn parse_roi(line: &KeyLine<'_>) -> Result<ExtraLine, ParseError> {
    let tokens: Vec<&str> = line.rest.split_whitespace().collect();
    if !(3..=4).contains(&tokens.len()) {
        return Err(ParseError::malformed(
            line.label(),
            format!("expected name, start, end and detector, got {} values", tokens.len()),
        ));
    }
    let number = |t: &str| {
        t.parse::<usize>()
            .map_err(|_| ParseError::malformed(line.label(), format!("'{t}' is not a channel")))
    };
    let detector = match tokens.get(3) {
        // `mca1` and `1` both name the detector labelled `MCA1`.
        Some(t) => number(t.trim_start_matches(|c: char| !c.is_ascii_digit()))?,
        None => 0,
    };
    Ok(ExtraLine::Roi(Roi {
        name: tokens[0].to_string(),
        start: number(tokens[1])?,
        end: number(tokens[2])?,
        detector,
    }))
}

fn parse_epoch(s: &str) -> Option<i64> {
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|v| v as i64))
}

fn parse_single<T: FromStr>(line: &KeyLine<'_>) -> Result<T, ParseError> {
    let [value] = parse_fixed::<T, 1>(line)?;
    Ok(value)
}

fn parse_fixed<T: FromStr, const N: usize>(line: &KeyLine<'_>) -> Result<[T; N], ParseError> {
    let tokens: Vec<&str> = line.rest.split_whitespace().collect();
    if tokens.len() != N {
        return Err(ParseError::malformed(
            line.label(),
            format!("expected {N} values, got {}", tokens.len()),
        ));
    }
    let values = tokens
        .iter()
        .map(|t| {
            t.parse::<T>()
                .map_err(|_| ParseError::malformed(line.label(), format!("'{t}' is not a number")))
        })
        .collect::<Result<Vec<T>, _>>()?;
    values
        .try_into()
        .map_err(|_| ParseError::malformed(line.label(), "wrong value count"))
}

fn parse_numbers(line: &KeyLine<'_>) -> Result<Vec<f64>, ParseError> {
    line.rest
        .split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| ParseError::malformed(line.label(), format!("'{t}' is not a number")))
        })
        .collect()
}

fn parse_count_time(line: &KeyLine<'_>) -> Result<CountTime, ParseError> {
    let mut tokens = line.rest.split_whitespace();
    let value = tokens
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| ParseError::malformed(line.label(), "missing count time"))?;
    let units = tokens
        .collect::<Vec<_>>()
        .join(" ")
        .replace(['(', ')'], "");
    Ok(CountTime { value, units })
}

/// Split label lists: labels may contain single spaces, so two or more
/// blanks (or a tab) separate them.
pub fn split_labels(s: &str) -> Vec<String> {
    s.replace('\t', "  ")
        .split("  ")
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn split_words(s: &str) -> Vec<String> {
    s.split_whitespace().map(String::from).collect()
}

/// Split a `<application>  User = <user>` comment.
fn user_comment(comment: &str) -> Option<(String, String)> {
    let idx = comment.find("User")?;
    let app = &comment[..idx];
    if !app.ends_with(char::is_whitespace) {
        return None;
    }
    let user = comment[idx + 4..].trim_start().strip_prefix('=')?.trim();
    Some((app.trim().to_string(), user.to_string()))
}

//  File header

/// Metadata scoped to every scan that follows it until the next header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileHeader {
    /// 1-based line where the block starts.
    pub first_line: usize,
    pub source: Option<String>,
    pub epoch: Option<i64>,
    pub date: Option<SpecDate>,
    pub user: Option<String>,
    /// Application (geometry) name, e.g. `fourc`.
    pub application: Option<String>,
    pub motor_names: Vec<String>,
    pub motor_mnemonics: Vec<String>,
    pub counter_names: Vec<String>,
    pub counter_mnemonics: Vec<String>,
    pub comments: Vec<String>,
    pub user_lines: Vec<String>,
    pub extra: ExtraLineSet,
    pub unknown: Vec<UnknownLine>,
    pub issues: Vec<ParseIssue>,
}

impl FileHeader {
    /// Parse one file header block.  `issues` carries anything the block
    /// assembler already flagged.
    pub fn parse(block: &str, first_line: usize, issues: Vec<ParseIssue>) -> Self {
        let mut header = Self {
            first_line,
            issues,
            ..Self::default()
        };
        let mut classifier = LineClassifier::new();
        for raw in raw_lines(block, 0, first_line) {
            match classifier.classify(raw.text) {
                LineKind::FileHeaderKey(key) | LineKind::ScanHeaderKey(key) => {
                    if !is_file_scoped(key.key) {
                        header.unknown.push(UnknownLine {
                            key: key.label(),
                            text: key.rest.to_string(),
                        });
                        continue;
                    }
                    match parse_field(&key) {
                        Ok(field) => header.apply(field),
                        Err(error) => header.issues.push(ParseIssue {
                            line: raw.number,
                            error,
                        }),
                    }
                }
                LineKind::Text(text) | LineKind::Mca(text) => header.unknown.push(UnknownLine {
                    key: String::new(),
                    text: text.to_string(),
                }),
                // Flagged by the assembler.
                LineKind::Data(_) | LineKind::Blank => {}
            }
        }
        header
    }

    fn apply(&mut self, field: HeaderField) {
        match field {
            HeaderField::File(f) => self.source = Some(f),
            HeaderField::Epoch(e) => self.epoch = Some(e),
            HeaderField::Date(d) => self.date = Some(d),
            HeaderField::MotorNames(n) => self.motor_names.extend(n),
            HeaderField::MotorMnemonics(n) => self.motor_mnemonics.extend(n),
            HeaderField::CounterNames(n) => self.counter_names.extend(n),
            HeaderField::CounterMnemonics(n) => self.counter_mnemonics.extend(n),
            HeaderField::Comment(c) => {
                if self.user.is_none()
                    && let Some((app, user)) = user_comment(&c)
                {
                    self.application = Some(app);
                    self.user = Some(user);
                }
                self.comments.push(c);
            }
            HeaderField::User(u) => self.user_lines.push(u),
            HeaderField::Extra(e) => self.extra.push(e),
            HeaderField::Unknown(u) => self.unknown.push(u),
            // Scan-only fields are filtered out by `is_file_scoped`.
            _ => {}
        }
    }
}

fn is_file_scoped(key: HeaderKey) -> bool {
    matches!(
        key,
        HeaderKey::Epoch
            | HeaderKey::File
            | HeaderKey::Date
            | HeaderKey::MotorNames
            | HeaderKey::MotorMnemonics
            | HeaderKey::CounterNames
            | HeaderKey::CounterMnemonics
            | HeaderKey::User
            | HeaderKey::Comment
            | HeaderKey::Extra
            | HeaderKey::Unknown(_)
    )
}

//  Scan header

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanHeader {
    /// `None` when the `#S` line could not be read.
    pub number: Option<u32>,
    pub command: String,
    pub date: Option<SpecDate>,
    pub columns: Option<usize>,
    /// Labels exactly as written on the `#L` line.
    pub labels: Vec<String>,
    pub motor_names: Vec<String>,
    pub motor_mnemonics: Vec<String>,
    pub counter_names: Vec<String>,
    pub counter_mnemonics: Vec<String>,
    pub positions: Vec<f64>,
    pub count_time: Option<CountTime>,
    pub geometry: Vec<Vec<f64>>,
    pub q: Vec<f64>,
    pub comments: Vec<String>,
    pub user_lines: Vec<String>,
    pub extra: ExtraLineSet,
    pub unknown: Vec<UnknownLine>,
}

impl ScanHeader {
    pub(crate) fn apply(&mut self, field: HeaderField) {
        match field {
            HeaderField::Scan { number, command } => {
                self.number = Some(number);
                self.command = command;
            }
            HeaderField::Date(d) => self.date = Some(d),
            // First `#N` and `#L` win.
            HeaderField::Columns(n) => {
                self.columns.get_or_insert(n);
            }
            HeaderField::Labels(l) => {
                if self.labels.is_empty() {
                    self.labels = l;
                }
            }
            HeaderField::MotorNames(n) => self.motor_names.extend(n),
            HeaderField::MotorMnemonics(n) => self.motor_mnemonics.extend(n),
            HeaderField::CounterNames(n) => self.counter_names.extend(n),
            HeaderField::CounterMnemonics(n) => self.counter_mnemonics.extend(n),
            HeaderField::Positions(p) => self.positions.extend(p),
            HeaderField::Time(t) => self.count_time = Some(t),
            HeaderField::Geometry(g) => self.geometry.push(g),
            HeaderField::Q(q) => self.q = q,
            HeaderField::Comment(c) => self.comments.push(c),
            HeaderField::User(u) => self.user_lines.push(u),
            HeaderField::Extra(e) => self.extra.push(e),
            HeaderField::Unknown(u) => self.unknown.push(u),
            HeaderField::File(f) => self.unknown.push(UnknownLine {
                key: "F".into(),
                text: f,
            }),
            HeaderField::Epoch(e) => self.unknown.push(UnknownLine {
                key: "E".into(),
                text: e.to_string(),
            }),
        }
    }

    /// Scalar column labels resolved against `#N`.
    ///
    /// Falls back to single-space splitting when the double-space split
    /// disagrees with `#N` but a plain split matches it.
    pub fn resolved_labels(&self) -> Vec<String> {
        let Some(n) = self.columns else {
            return self.labels.clone();
        };
        let mut labels = if self.labels.len() != n {
            let words: Vec<String> = self.labels.iter().flat_map(|l| split_words(l)).collect();
            if words.len() == n { words } else { self.labels.clone() }
        } else {
            self.labels.clone()
        };
        labels.truncate(n);
        while labels.len() < n {
            labels.push(format!("col{}", labels.len()));
        }
        labels
    }
}
