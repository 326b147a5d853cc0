//! Block assembly: `<FileBlock> <ScanBlock> <DataBlock> <ScanBlock> ...`
//!
//! The assembler only finds boundaries.  Field parsing happens later, per
//! block, on the byte span recorded here.

use std::ops::Range;

use crate::error::{ParseError, ParseIssue};
use crate::line::{HeaderKey, LineClassifier, LineKind, RawLine, raw_lines};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    FileHeader,
    Scan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    /// Byte span in the source, from the opening line to the last line
    /// before the next block.
    pub span: Range<usize>,
    /// 1-based line number of the opening line.
    pub first_line: usize,
    /// Byte offset of the first data line (scans only).
    pub data_start: Option<usize>,
    /// Structural problems noticed while assembling.
    pub issues: Vec<ParseIssue>,
}

impl Block {
    fn open(kind: BlockKind, line: &RawLine<'_>) -> Self {
        Self {
            kind,
            span: line.start..line.end,
            first_line: line.number,
            data_start: None,
            issues: Vec::new(),
        }
    }
}

/// Explicit assembly state: the classifier's scope and the block being
/// filled.
#[derive(Debug, Default)]
pub struct BlockAssembler {
    classifier: LineClassifier,
    open: Option<Block>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next line.  Returns the block this line closed, if any.
    pub fn push(&mut self, line: &RawLine<'_>) -> Option<Block> {
        let kind = self.classifier.classify(line.text);
        let current = self.open.as_ref().map(|b| b.kind);

        let opens = match kind {
            LineKind::ScanHeaderKey(k) if k.key == HeaderKey::Scan => Some(BlockKind::Scan),
            LineKind::FileHeaderKey(k) => match current {
                Some(BlockKind::FileHeader) if k.key != HeaderKey::File => None,
                _ => Some(BlockKind::FileHeader),
            },
            LineKind::Blank => None,
            // Anything before the first header opens an implicit file header.
            _ if current.is_none() => Some(BlockKind::FileHeader),
            _ => None,
        };

        let closed = match opens {
            Some(block_kind) => self.open.replace(Block::open(block_kind, line)),
            None => None,
        };

        if let Some(block) = self.open.as_mut() {
            block.span.end = line.end;
            if let LineKind::Data(_) = kind {
                match block.kind {
                    BlockKind::FileHeader => block.issues.push(ParseIssue {
                        line: line.number,
                        error: ParseError::DataWithoutScan,
                    }),
                    BlockKind::Scan => {
                        block.data_start.get_or_insert(line.start);
                    }
                }
            }
        }
        closed
    }

    /// End of input: hand back the block still open.
    pub fn finish(self) -> Option<Block> {
        self.open
    }
}

/// Assemble every block of `text`.
pub fn assemble(text: &str) -> Vec<Block> {
    let mut assembler = BlockAssembler::new();
    let mut blocks: Vec<Block> = raw_lines(text, 0, 1)
        .filter_map(|line| assembler.push(&line))
        .collect();
    blocks.extend(assembler.finish());
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternating_blocks() {
        let text = "#F a.dat\n#E 100\n#O0 th\n\n#S 1 ascan\n#N 1\n#L x\n1\n2\n\n#C aborted\n\
                    #S 2 dscan\n#N 1\n#L x\n3\n#E 200\n#O0 chi\n#S 3 ct\n";
        let blocks = assemble(text);
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::FileHeader,
                BlockKind::Scan,
                BlockKind::Scan,
                BlockKind::FileHeader,
                BlockKind::Scan,
            ]
        );
        assert_eq!(blocks[1].first_line, 5);
        // Trailing comment after the data stays with its scan.
        assert!(text[blocks[1].span.clone()].contains("#C aborted"));
        assert!(text[blocks[1].span.clone()].starts_with("#S 1"));
        assert_eq!(&text[blocks[1].data_start.unwrap()..][..2], "1\n");
        assert!(blocks[4].data_start.is_none());
        // Spans tile the file.
        assert_eq!(blocks[0].span.start, 0);
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].span.end, pair[1].span.start);
        }
        assert_eq!(blocks[4].span.end, text.len());
    }

    #[test]
    fn repeated_file_line_starts_new_header() {
        let blocks = assemble("#F a\n#D today\n#F b\n#D tomorrow\n");
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.kind == BlockKind::FileHeader));
    }

    #[test]
    fn data_before_any_scan_is_flagged() {
        let blocks = assemble("1 2 3\n#S 1 ct\n4\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::FileHeader);
        assert_eq!(
            blocks[0].issues,
            vec![ParseIssue {
                line: 1,
                error: ParseError::DataWithoutScan
            }]
        );
        assert!(blocks[1].issues.is_empty());
    }

    #[test]
    fn leading_blank_lines_belong_to_no_block() {
        let text = "\n\n#S 1 ct\n1\n";
        let blocks = assemble(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].span, 2..text.len());
        assert_eq!(blocks[0].first_line, 3);
    }
}
