//! Scan index: one forward pass recording every scan's number, byte span and
//! owning file header.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::assembler::{Block, BlockAssembler, BlockKind};
use crate::header::{FileHeader, HeaderField, parse_field};
use crate::line::{LineClassifier, LineKind, raw_lines};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// 0-based position in file order.
    pub position: usize,
    /// `None` when the `#S` line carries no readable number.
    pub number: Option<u32>,
    /// 1 for the first scan with this number, 2 for the next one, ...
    pub order: usize,
    pub command: String,
    pub span: Range<usize>,
    pub first_line: usize,
    pub data_start: Option<usize>,
    /// Position of the file header in force, if any precedes the scan.
    pub header: Option<usize>,
}

impl ScanEntry {
    /// `<number> <command>`, or `<number>.<order> <command>` for repeats.
    pub fn label(&self) -> String {
        scan_label(self.number, self.order, &self.command)
    }
}

/// Display label shared by index entries and parsed scans.
pub(crate) fn scan_label(number: Option<u32>, order: usize, command: &str) -> String {
    let number = match number {
        Some(n) if order > 1 => format!("{n}.{order}"),
        Some(n) => n.to_string(),
        None => "?".to_string(),
    };
    if command.is_empty() {
        number
    } else {
        format!("{number} {command}")
    }
}

/// Result of a lookup by scan number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberLookup {
    /// Position of the first scan carrying the number.
    pub position: usize,
    /// How many scans carry it.
    pub count: usize,
}

#[derive(Debug, Default)]
pub struct ScanIndex {
    scans: Vec<ScanEntry>,
    headers: Vec<Arc<FileHeader>>,
    by_number: HashMap<u32, Vec<usize>>,
}

impl ScanIndex {
    /// Index `text` in a single pass.  File headers are parsed here since
    /// every later scan shares them; scans are only located.
    pub fn build(text: &str) -> Self {
        let mut index = Self::default();
        let mut assembler = BlockAssembler::new();
        for line in raw_lines(text, 0, 1) {
            if let Some(block) = assembler.push(&line) {
                index.add(text, block);
            }
        }
        if let Some(block) = assembler.finish() {
            index.add(text, block);
        }
        debug!(
            scans = index.scans.len(),
            headers = index.headers.len(),
            "scan index built"
        );
        index
    }

    fn add(&mut self, text: &str, block: Block) {
        let body = &text[block.span.clone()];
        match block.kind {
            BlockKind::FileHeader => {
                let header = FileHeader::parse(body, block.first_line, block.issues);
                for issue in &header.issues {
                    warn!(line = issue.line, "file header: {}", issue.error);
                }
                self.headers.push(Arc::new(header));
            }
            BlockKind::Scan => {
                let position = self.scans.len();
                let (number, command) = scan_line(body);
                let order = match number {
                    Some(n) => {
                        let positions = self.by_number.entry(n).or_default();
                        positions.push(position);
                        positions.len()
                    }
                    None => {
                        warn!(line = block.first_line, "scan line without a number");
                        1
                    }
                };
                self.scans.push(ScanEntry {
                    position,
                    number,
                    order,
                    command,
                    span: block.span,
                    first_line: block.first_line,
                    data_start: block.data_start,
                    header: self.headers.len().checked_sub(1),
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn entries(&self) -> &[ScanEntry] {
        &self.scans
    }

    pub fn headers(&self) -> &[Arc<FileHeader>] {
        &self.headers
    }

    pub fn lookup_by_position(&self, position: usize) -> Option<&ScanEntry> {
        self.scans.get(position)
    }

    /// First scan with `number`, plus how many scans share it.  Use
    /// [`lookup_by_number_order`](Self::lookup_by_number_order) or a
    /// position to reach the others.
    pub fn lookup_by_number(&self, number: u32) -> Option<NumberLookup> {
        let positions = self.by_number.get(&number)?;
        Some(NumberLookup {
            position: *positions.first()?,
            count: positions.len(),
        })
    }

    /// The `order`-th (1-based) scan with `number`.
    pub fn lookup_by_number_order(&self, number: u32, order: usize) -> Option<&ScanEntry> {
        let position = *self.by_number.get(&number)?.get(order.checked_sub(1)?)?;
        self.scans.get(position)
    }

    pub fn file_header(&self, entry: &ScanEntry) -> Option<&Arc<FileHeader>> {
        entry.header.and_then(|h| self.headers.get(h))
    }

    /// Scan numbers used more than once, with their counts.
    pub fn duplicates(&self) -> Vec<(u32, usize)> {
        let mut dups: Vec<_> = self
            .by_number
            .iter()
            .filter(|(_, p)| p.len() > 1)
            .map(|(n, p)| (*n, p.len()))
            .collect();
        dups.sort_unstable();
        dups
    }
}

fn scan_line(body: &str) -> (Option<u32>, String) {
    let first = body.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let LineKind::ScanHeaderKey(key) = LineClassifier::new().classify(first) else {
        return (None, String::new());
    };
    match parse_field(&key) {
        Ok(HeaderField::Scan { number, command }) => (Some(number), command),
        _ => (None, key.rest.to_string()),
    }
}
