use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::align::AlignmentWarning;
use crate::domain::{BookCode, VerseSpan};
use crate::project::{Project, strip_book_number};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerseBlock {
    pub book: BookCode,
    pub chapter: u32,
    pub span: VerseSpan,
    pub text: String,
}

static ID_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\\id\s+([A-Za-z0-9]{3})\b").expect("static regex")
});

/// Content of these markers is never verse text, up to the matching `*` close.
const NOTE_MARKERS: &[&str] = &["f", "fe", "ef", "x", "ex", "fig", "va", "vp", "ca", "rq"];

/// Paragraph markers whose text is not verse text (titles, headings, intros).
const SKIPPED_PARAGRAPHS: &[&str] = &[
    "id", "ide", "h", "toc", "toca", "rem", "sts", "usfm", "mt", "mte", "ms", "mr", "s", "sr",
    "r", "d", "sp", "sd", "cl", "cp", "cd", "qa", "qd", "lit", "imt", "imte", "is", "ip", "ipi",
    "im", "imi", "ipq", "imq", "ipr", "iq", "ib", "ili", "iot", "io", "iex", "ie", "periph",
];

const VERSE_PARAGRAPHS: &[&str] = &[
    "p", "m", "po", "pr", "cls", "pmo", "pm", "pmc", "pmr", "pi", "mi", "nb", "pc", "ph", "q",
    "qr", "qc", "qm", "li", "lf", "lim", "lh", "b", "tr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Marker { name: &'a str, closing: bool },
    Text(&'a str),
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'\\' {
            pos += 1;
            continue;
        }
        let name_start = pos + 1;
        let mut name_end = name_start;
        while name_end < bytes.len()
            && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'+')
        {
            name_end += 1;
        }
        if name_end > name_start && is_milestone_suffix(&bytes[name_end..]) {
            // `\qt-s |who="Jesus"\*`: milestones carry attributes, never text.
            if text_start < pos {
                tokens.push(Token::Text(&source[text_start..pos]));
            }
            let after_name = name_end + 2;
            pos = match source[after_name..].find('\\') {
                Some(offset) if source[after_name + offset..].starts_with("\\*") => {
                    after_name + offset + 2
                }
                _ => after_name,
            };
            text_start = pos;
            continue;
        }
        let closing = name_end < bytes.len() && bytes[name_end] == b'*';
        if name_end == name_start && !closing {
            // A lone backslash is text.
            pos += 1;
            continue;
        }

        if text_start < pos {
            tokens.push(Token::Text(&source[text_start..pos]));
        }
        let name = source[name_start..name_end].trim_start_matches('+');
        tokens.push(Token::Marker { name, closing });

        pos = if closing {
            name_end + 1
        } else if name_end < bytes.len() && bytes[name_end].is_ascii_whitespace() {
            // One whitespace character after an opening marker is part of the marker.
            if bytes[name_end] == b'\r' && bytes.get(name_end + 1) == Some(&b'\n') {
                name_end + 2
            } else {
                name_end + 1
            }
        } else {
            name_end
        };
        text_start = pos;
    }
    if text_start < bytes.len() {
        tokens.push(Token::Text(&source[text_start..]));
    }
    tokens
}

fn is_milestone_suffix(rest: &[u8]) -> bool {
    matches!(rest, [b'-', b's' | b'e', next, ..] if !next.is_ascii_alphanumeric())
        || matches!(rest, [b'-', b's' | b'e'])
}

/// `s1` -> `s`, `toc2` -> `toc`, `q` -> `q`.
fn base_name(name: &str) -> &str {
    name.trim_end_matches(|ch: char| ch.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Nothing,
    ChapterNumber,
    VerseNumber,
}

struct Pending {
    chapter: u32,
    span: VerseSpan,
    text: String,
}

struct DocumentParser<'a> {
    book: BookCode,
    file: &'a str,
    chapter: Option<u32>,
    current: Option<Pending>,
    expect: Expect,
    in_skipped_paragraph: bool,
    note_depth: usize,
    char_depth: usize,
    blocks: Vec<VerseBlock>,
    warnings: &'a mut Vec<AlignmentWarning>,
}

impl<'a> DocumentParser<'a> {
    fn new(book: BookCode, file: &'a str, warnings: &'a mut Vec<AlignmentWarning>) -> Self {
        Self {
            book,
            file,
            chapter: None,
            current: None,
            expect: Expect::Nothing,
            in_skipped_paragraph: false,
            note_depth: 0,
            char_depth: 0,
            blocks: Vec::new(),
            warnings,
        }
    }

    fn warn(&mut self, detail: String) {
        self.warnings.push(AlignmentWarning::UnparseableVerse {
            file: self.file.to_string(),
            detail,
        });
    }

    fn run(mut self, tokens: &[Token<'_>]) -> Vec<VerseBlock> {
        for token in tokens {
            match *token {
                Token::Marker { name, closing } => self.marker(name, closing),
                Token::Text(text) => self.text(text),
            }
        }
        self.missing_number();
        self.finish_verse();
        self.blocks
    }

    fn marker(&mut self, name: &str, closing: bool) {
        let base = base_name(name);
        if NOTE_MARKERS.contains(&base) {
            if closing {
                self.note_depth = self.note_depth.saturating_sub(1);
            } else {
                self.note_depth += 1;
            }
            return;
        }
        if self.note_depth > 0 {
            // Markers inside a note (`\fr`, `\ft`, `\xo`, ...) belong to the note.
            return;
        }
        if closing {
            self.char_depth = self.char_depth.saturating_sub(1);
            return;
        }

        self.missing_number();
        match base {
            "c" => {
                self.finish_verse();
                self.in_skipped_paragraph = false;
                self.char_depth = 0;
                self.expect = Expect::ChapterNumber;
            }
            "v" => {
                self.finish_verse();
                self.in_skipped_paragraph = false;
                self.char_depth = 0;
                self.expect = Expect::VerseNumber;
            }
            _ if SKIPPED_PARAGRAPHS.contains(&base) => {
                self.in_skipped_paragraph = true;
                self.char_depth = 0;
            }
            _ if VERSE_PARAGRAPHS.contains(&base) => {
                self.in_skipped_paragraph = false;
                self.char_depth = 0;
                self.push_text(" ");
            }
            _ => self.char_depth += 1,
        }
    }

    fn missing_number(&mut self) {
        match self.expect {
            Expect::ChapterNumber => {
                self.chapter = None;
                self.warn("chapter marker without a number".to_string());
            }
            Expect::VerseNumber => {
                self.warn(format!(
                    "verse marker without a number in chapter {}",
                    self.chapter.map(|c| c.to_string()).unwrap_or_default()
                ));
            }
            Expect::Nothing => {}
        }
        self.expect = Expect::Nothing;
    }

    fn text(&mut self, text: &str) {
        if self.note_depth > 0 {
            return;
        }
        match self.expect {
            Expect::ChapterNumber => {
                self.expect = Expect::Nothing;
                let number = text.split_whitespace().next().unwrap_or_default();
                self.chapter = number.parse().ok();
                if self.chapter.is_none() {
                    self.warn(format!("unparseable chapter number `{number}`"));
                }
            }
            Expect::VerseNumber => {
                self.expect = Expect::Nothing;
                let trimmed = text.trim_start();
                let (number, rest) = trimmed
                    .split_once(char::is_whitespace)
                    .unwrap_or((trimmed, ""));
                let Some(chapter) = self.chapter else {
                    self.warn(format!("verse {number} outside any chapter"));
                    return;
                };
                match number.parse::<VerseSpan>() {
                    Ok(span) => {
                        self.current = Some(Pending {
                            chapter,
                            span,
                            text: String::new(),
                        });
                        self.push_text(rest);
                    }
                    Err(_) => {
                        self.warn(format!("unparseable verse number `{number}` in chapter {chapter}"));
                    }
                }
            }
            Expect::Nothing => {
                if !self.in_skipped_paragraph {
                    self.push_text(text);
                }
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        let text = if self.char_depth > 0 {
            // `\w word|lemma="..."\w*`: the attribute list is not text.
            text.split('|').next().unwrap_or_default()
        } else {
            text
        };
        if let Some(current) = self.current.as_mut() {
            current.text.push_str(text);
        }
    }

    fn finish_verse(&mut self) {
        let Some(pending) = self.current.take() else {
            return;
        };
        let text = pending.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if let Some(last) = self.blocks.last_mut() {
            if last.chapter == pending.chapter && last.span == pending.span {
                // Segmented verses (`\v 3a`, `\v 3b`) join into one block.
                if !text.is_empty() {
                    if !last.text.is_empty() {
                        last.text.push(' ');
                    }
                    last.text.push_str(&text);
                }
                return;
            }
        }
        self.blocks.push(VerseBlock {
            book: self.book,
            chapter: pending.chapter,
            span: pending.span,
            text,
        });
    }
}

/// Book named by `\id`, else guessed from a file name like `GENeng.usfm`.
fn document_book(source: &str, file_name: &str) -> Option<BookCode> {
    if let Some(captures) = ID_LINE.captures(source) {
        if let Ok(book) = captures[1].parse() {
            return Some(book);
        }
    }
    let name = strip_book_number(file_name).unwrap_or(file_name);
    name.get(..3).and_then(|prefix| prefix.parse().ok())
}

/// Parses one document. Returns no blocks when the book cannot be determined.
pub fn parse_document(
    source: &str,
    file_name: &str,
    warnings: &mut Vec<AlignmentWarning>,
) -> Vec<VerseBlock> {
    let source = source.trim_start_matches('\u{feff}');
    let Some(book) = document_book(source, file_name) else {
        warnings.push(AlignmentWarning::UnknownBook {
            file: file_name.to_string(),
        });
        return Vec::new();
    };
    let tokens = tokenize(source);
    DocumentParser::new(book, file_name, warnings).run(&tokens)
}

pub fn parse_project(project: &Project, warnings: &mut Vec<AlignmentWarning>) -> Vec<VerseBlock> {
    let mut blocks = Vec::new();
    for path in &project.documents {
        let file_name = display_name(&project.dir, path);
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warnings.push(AlignmentWarning::UnparseableVerse {
                    file: file_name,
                    detail: format!("unreadable document: {err}"),
                });
                continue;
            }
        };
        let source = String::from_utf8_lossy(&bytes);
        blocks.extend(parse_document(&source, &file_name, warnings));
    }
    blocks
}

fn display_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
