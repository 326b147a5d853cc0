//! Line classification.
//!
//! Every line of a SPEC file is either a `#<key>` header line, a numeric
//! data line, an `@A` spectrum line, free text, or blank.  Whether a header
//! line belongs to the file header or to a scan header depends only on its
//! position in the stream, so [`LineClassifier`] carries the current scope.

use serde::Serialize;

/// The closed vocabulary of header keys, plus a fallback for anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HeaderKey {
    Scan,
    Epoch,
    File,
    Date,
    Columns,
    Labels,
    MotorNames,
    MotorMnemonics,
    CounterNames,
    CounterMnemonics,
    User,
    Comment,
    Positions,
    Time,
    Geometry,
    Q,
    Extra,
    Unknown(char),
}

impl HeaderKey {
    pub fn from_char(c: char) -> Self {
        match c {
            'S' => Self::Scan,
            'E' => Self::Epoch,
            'F' => Self::File,
            'D' => Self::Date,
            'N' => Self::Columns,
            'L' => Self::Labels,
            'O' => Self::MotorNames,
            'o' => Self::MotorMnemonics,
            'J' => Self::CounterNames,
            'j' => Self::CounterMnemonics,
            'U' => Self::User,
            'C' => Self::Comment,
            'P' => Self::Positions,
            'T' => Self::Time,
            'G' => Self::Geometry,
            'Q' => Self::Q,
            '@' => Self::Extra,
            other => Self::Unknown(other),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Scan => 'S',
            Self::Epoch => 'E',
            Self::File => 'F',
            Self::Date => 'D',
            Self::Columns => 'N',
            Self::Labels => 'L',
            Self::MotorNames => 'O',
            Self::MotorMnemonics => 'o',
            Self::CounterNames => 'J',
            Self::CounterMnemonics => 'j',
            Self::User => 'U',
            Self::Comment => 'C',
            Self::Positions => 'P',
            Self::Time => 'T',
            Self::Geometry => 'G',
            Self::Q => 'Q',
            Self::Extra => '@',
            Self::Unknown(c) => c,
        }
    }
}

/// A `#<key><suffix> <rest>` line split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLine<'a> {
    pub key: HeaderKey,
    /// Text glued to the key letter: `0` in `#O0`, `CHANN` in `#@CHANN`.
    pub suffix: &'a str,
    pub rest: &'a str,
}

impl KeyLine<'_> {
    /// Key letter and suffix as written, e.g. `P0` or `@CHANN`.
    pub fn label(&self) -> String {
        format!("{}{}", self.key.as_char(), self.suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    File,
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    FileHeaderKey(KeyLine<'a>),
    ScanHeaderKey(KeyLine<'a>),
    /// Starts like a number.
    Data(&'a str),
    /// `@A` spectrum line, prefix stripped.
    Mca(&'a str),
    /// Anything else that is not a header line.
    Text(&'a str),
    Blank,
}

/// Stateful classifier: tracks whether header lines currently belong to
/// the file header or to a scan.
#[derive(Debug, Default, Clone)]
pub struct LineClassifier {
    scope: Option<Scope>,
}

impl LineClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    pub fn classify<'a>(&mut self, line: &'a str) -> LineKind<'a> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "#" {
            return LineKind::Blank;
        }
        if let Some(rest) = trimmed.strip_prefix("@A") {
            return LineKind::Mca(rest.trim());
        }
        if let Some(body) = trimmed.strip_prefix('#') {
            let key_line = split_key(body);
            let scope = match key_line.key {
                HeaderKey::Scan => Scope::Scan,
                HeaderKey::File => Scope::File,
                // `#E` after a scan starts a fresh file header.
                HeaderKey::Epoch if self.scope == Some(Scope::Scan) => Scope::File,
                _ => self.scope.unwrap_or(Scope::File),
            };
            self.scope = Some(scope);
            return match scope {
                Scope::File => LineKind::FileHeaderKey(key_line),
                Scope::Scan => LineKind::ScanHeaderKey(key_line),
            };
        }
        if starts_numeric(trimmed) {
            LineKind::Data(trimmed)
        } else {
            LineKind::Text(trimmed)
        }
    }
}

fn split_key(body: &str) -> KeyLine<'_> {
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return KeyLine {
            key: HeaderKey::Unknown(' '),
            suffix: "",
            rest: "",
        };
    };
    if first.is_whitespace() {
        return KeyLine {
            key: HeaderKey::Unknown(' '),
            suffix: "",
            rest: body.trim(),
        };
    }
    let after = chars.as_str();
    let split = after.find(char::is_whitespace).unwrap_or(after.len());
    KeyLine {
        key: HeaderKey::from_char(first),
        suffix: &after[..split],
        rest: after[split..].trim(),
    }
}

fn starts_numeric(s: &str) -> bool {
    matches!(s.chars().next(), Some(c) if c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
}

/// One physical line with its location in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    /// 1-based line number.
    pub number: usize,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset just past the line terminator.
    pub end: usize,
    /// Line content without the terminator.
    pub text: &'a str,
}

/// Iterate the lines of `text`, numbering from `first_line` and offsetting
/// byte positions by `base`.
pub fn raw_lines(text: &str, base: usize, first_line: usize) -> impl Iterator<Item = RawLine<'_>> {
    let mut offset = base;
    text.split_inclusive('\n')
        .enumerate()
        .map(move |(i, chunk)| {
            let start = offset;
            offset += chunk.len();
            let text = chunk
                .strip_suffix('\n')
                .map(|s| s.strip_suffix('\r').unwrap_or(s))
                .unwrap_or(chunk);
            RawLine {
                number: first_line + i,
                start,
                end: offset,
                text,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_line_switches_scope() {
        let mut c = LineClassifier::new();
        assert!(matches!(c.classify("#F /tmp/data"), LineKind::FileHeaderKey(_)));
        assert!(matches!(c.classify("#C some note"), LineKind::FileHeaderKey(_)));
        match c.classify("#S 3  ascan th 0 1 10 1") {
            LineKind::ScanHeaderKey(k) => {
                assert_eq!(k.key, HeaderKey::Scan);
                assert_eq!(k.rest, "3  ascan th 0 1 10 1");
            }
            other => panic!("unexpected {other:?}"),
        }
        // Same letter, different scope.
        assert!(matches!(c.classify("#C aborted"), LineKind::ScanHeaderKey(_)));
        assert!(matches!(c.classify("#E 1390658109"), LineKind::FileHeaderKey(_)));
    }

    #[test]
    fn suffix_and_extra_keys() {
        let mut c = LineClassifier::new();
        let LineKind::FileHeaderKey(k) = c.classify("#O0 Two Theta  Theta") else {
            panic!("expected header key");
        };
        assert_eq!(k.key, HeaderKey::MotorNames);
        assert_eq!(k.suffix, "0");
        assert_eq!(k.rest, "Two Theta  Theta");

        let LineKind::FileHeaderKey(k) = c.classify("#@CHANN 4 0 3 1") else {
            panic!("expected header key");
        };
        assert_eq!(k.key, HeaderKey::Extra);
        assert_eq!(k.suffix, "CHANN");
        assert_eq!(k.label(), "@CHANN");

        let LineKind::FileHeaderKey(k) = c.classify("#X whatever") else {
            panic!("expected header key");
        };
        assert_eq!(k.key, HeaderKey::Unknown('X'));
    }

    #[test]
    fn data_mca_text_and_blank() {
        let mut c = LineClassifier::new();
        assert_eq!(c.classify("  -0.5 12"), LineKind::Data("-0.5 12"));
        assert_eq!(c.classify(".5 1"), LineKind::Data(".5 1"));
        assert_eq!(c.classify("@A 1 2 3\\"), LineKind::Mca("1 2 3\\"));
        assert_eq!(c.classify("nan 1"), LineKind::Text("nan 1"));
        assert_eq!(c.classify("   "), LineKind::Blank);
        assert_eq!(c.classify("#"), LineKind::Blank);
    }

    #[test]
    fn raw_lines_track_offsets() {
        let text = "#S 1 a\r\n1 2\n\n3 4";
        let lines: Vec<_> = raw_lines(text, 10, 5).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].text, "#S 1 a");
        assert_eq!(lines[0].start, 10);
        assert_eq!(lines[1].start, 18);
        assert_eq!(lines[2].text, "");
        assert_eq!(lines[3].number, 8);
        assert_eq!(lines[3].end, 10 + text.len());
    }
}
