use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::domain::VerseRef;
use crate::error::CorpusError;
use crate::layout::write_bytes_atomic;
use crate::reference::CanonicalReference;
use crate::usfm::VerseBlock;

pub const RANGE_MARKER: &str = "<range>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignedLine {
    Text(String),
    Empty,
    RangeContinuation,
}

impl AlignedLine {
    pub fn as_str(&self) -> &str {
        match self {
            AlignedLine::Text(text) => text,
            AlignedLine::Empty => "",
            AlignedLine::RangeContinuation => RANGE_MARKER,
        }
    }
}

impl fmt::Display for AlignedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentWarning {
    OutOfReference { verse: VerseRef },
    UnparseableVerse { file: String, detail: String },
    DuplicateVerse { verse: VerseRef },
    /// Range whose first verse is not canonical.
    OrphanedRange { span: String },
    UnknownBook { file: String },
}

impl fmt::Display for AlignmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentWarning::OutOfReference { verse } => {
                write!(f, "{verse} is not in the canonical reference")
            }
            AlignmentWarning::UnparseableVerse { file, detail } => write!(f, "{file}: {detail}"),
            AlignmentWarning::DuplicateVerse { verse } => write!(f, "{verse} appears more than once"),
            AlignmentWarning::OrphanedRange { span } => {
                write!(f, "range {span} starts outside the canonical reference")
            }
            AlignmentWarning::UnknownBook { file } => write!(f, "{file}: no book code"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub verses: usize,
    pub ranges: usize,
    /// Continuation lines with no text line before them.
    pub empty_ranges: usize,
    pub lines: usize,
}

impl CorpusStats {
    pub fn of(lines: &[AlignedLine]) -> Self {
        let mut stats = CorpusStats {
            lines: lines.len(),
            ..Default::default()
        };
        let mut after_empty = true;
        for line in lines {
            match line {
                AlignedLine::Text(_) => {
                    stats.verses += 1;
                    after_empty = false;
                }
                AlignedLine::Empty => after_empty = true,
                AlignedLine::RangeContinuation => {
                    stats.ranges += 1;
                    if after_empty {
                        stats.empty_ranges += 1;
                    }
                }
            }
        }
        stats
    }
}

#[derive(Debug, Clone)]
pub struct Alignment {
    pub lines: Vec<AlignedLine>,
    pub warnings: Vec<AlignmentWarning>,
}

impl Alignment {
    pub fn stats(&self) -> CorpusStats {
        CorpusStats::of(&self.lines)
    }
}

/// Aligns `blocks` to `reference`. Always yields `reference.len()` lines.
pub fn align(
    blocks: &[VerseBlock],
    reference: &CanonicalReference,
) -> Result<Alignment, CorpusError> {
    let mut warnings = Vec::new();
    let mut covering: HashMap<VerseRef, usize> = HashMap::new();

    for (index, block) in blocks.iter().enumerate() {
        let first = VerseRef::new(block.book, block.chapter, block.span.first);
        if block.span.is_range() && !reference.contains(&first) {
            warnings.push(AlignmentWarning::OrphanedRange {
                span: span_label(block),
            });
        }
        for verse in block.span.verses() {
            let vref = VerseRef::new(block.book, block.chapter, verse);
            if !reference.contains(&vref) {
                warnings.push(AlignmentWarning::OutOfReference { verse: vref });
                continue;
            }
            if covering.contains_key(&vref) {
                warnings.push(AlignmentWarning::DuplicateVerse { verse: vref });
                continue;
            }
            covering.insert(vref, index);
        }
    }

    let lines: Vec<AlignedLine> = reference
        .iter()
        .map(|vref| match covering.get(vref).map(|&index| &blocks[index]) {
            None => AlignedLine::Empty,
            Some(block) if block.span.first == vref.verse => {
                if block.text.is_empty() {
                    AlignedLine::Empty
                } else {
                    AlignedLine::Text(block.text.clone())
                }
            }
            Some(_) => AlignedLine::RangeContinuation,
        })
        .collect();

    if lines.len() != reference.len() {
        return Err(CorpusError::AlignmentLength {
            expected: reference.len(),
            actual: lines.len(),
        });
    }
    Ok(Alignment { lines, warnings })
}

fn span_label(block: &VerseBlock) -> String {
    format!("{} {}:{}", block.book, block.chapter, block.span)
}

/// Replaces continuation markers that follow an empty line (or open the file)
/// with empty lines. Returns the number of lines changed.
pub fn tidy_empty_ranges(lines: &mut [AlignedLine]) -> usize {
    let mut changed = 0;
    let mut after_empty = true;
    for line in lines.iter_mut() {
        match line {
            AlignedLine::Text(_) => after_empty = false,
            AlignedLine::Empty => after_empty = true,
            AlignedLine::RangeContinuation => {
                if after_empty {
                    *line = AlignedLine::Empty;
                    changed += 1;
                }
            }
        }
    }
    changed
}

pub fn write_corpus(path: &Path, lines: &[AlignedLine]) -> Result<(), CorpusError> {
    let mut content = String::with_capacity(lines.len() * 64);
    for line in lines {
        content.push_str(line.as_str());
        content.push('\n');
    }
    write_bytes_atomic(path, content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VerseSpan;

    fn reference(lines: &str) -> CanonicalReference {
        CanonicalReference::parse(lines).unwrap()
    }

    fn block(book: &str, chapter: u32, span: &str, text: &str) -> VerseBlock {
        VerseBlock {
            book: book.parse().unwrap(),
            chapter,
            span: span.parse::<VerseSpan>().unwrap(),
            text: text.to_string(),
        }
    }

    #[test]
    fn range_emits_text_then_markers() {
        let reference = reference("GEN 1:1\nGEN 1:2\nGEN 1:3\nGEN 1:4\n");
        let blocks = [block("GEN", 1, "1-3", "In the beginning"), block("GEN", 1, "4", "Light")];
        let alignment = align(&blocks, &reference).unwrap();
        let rendered: Vec<&str> = alignment.lines.iter().map(AlignedLine::as_str).collect();
        assert_eq!(rendered, ["In the beginning", "<range>", "<range>", "Light"]);
        assert!(alignment.warnings.is_empty());
    }

    #[test]
    fn duplicate_verse_keeps_first_block() {
        let reference = reference("GEN 1:1\nGEN 1:2\n");
        let blocks = [
            block("GEN", 1, "1", "first"),
            block("GEN", 1, "1-2", "second"),
        ];
        let alignment = align(&blocks, &reference).unwrap();
        assert_eq!(alignment.lines[0], AlignedLine::Text("first".into()));
        assert_eq!(alignment.lines[1], AlignedLine::RangeContinuation);
        assert_eq!(
            alignment.warnings,
            [AlignmentWarning::DuplicateVerse {
                verse: "GEN 1:1".parse().unwrap()
            }]
        );
    }

    #[test]
    fn orphaned_range_is_reported() {
        let reference = reference("ROM 16:25\nROM 16:26\n");
        let blocks = [block("ROM", 16, "24-26", "Now to him")];
        let alignment = align(&blocks, &reference).unwrap();
        assert_eq!(
            alignment.lines,
            [AlignedLine::RangeContinuation, AlignedLine::RangeContinuation]
        );
        assert!(alignment.warnings.contains(&AlignmentWarning::OrphanedRange {
            span: "ROM 16:24-26".to_string()
        }));
        assert_eq!(alignment.stats().empty_ranges, 2);
    }

    #[test]
    fn tidy_cascades_through_marker_runs() {
        let mut lines = vec![
            AlignedLine::RangeContinuation,
            AlignedLine::Text("a".into()),
            AlignedLine::RangeContinuation,
            AlignedLine::Empty,
            AlignedLine::RangeContinuation,
            AlignedLine::RangeContinuation,
        ];
        assert_eq!(tidy_empty_ranges(&mut lines), 3);
        assert_eq!(
            lines,
            [
                AlignedLine::Empty,
                AlignedLine::Text("a".into()),
                AlignedLine::RangeContinuation,
                AlignedLine::Empty,
                AlignedLine::Empty,
                AlignedLine::Empty,
            ]
        );
    }

    #[test]
    fn stats_count_lines() {
        let lines = [
            AlignedLine::Text("a".into()),
            AlignedLine::RangeContinuation,
            AlignedLine::Empty,
        ];
        assert_eq!(
            CorpusStats::of(&lines),
            CorpusStats {
                verses: 1,
                ranges: 1,
                empty_ranges: 0,
                lines: 3
            }
        );
    }
}
