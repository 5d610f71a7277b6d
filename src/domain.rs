use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::CorpusError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TranslationId(String);

impl TranslationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TranslationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TranslationId {
    type Err = CorpusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(CorpusError::InvalidTranslationId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for TranslationId {
    type Error = CorpusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TranslationId> for String {
    fn from(value: TranslationId) -> Self {
        value.0
    }
}

/// Three character book code (`GEN`, `1SA`, `REV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookCode([u8; 3]);

impl BookCode {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for BookCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookCode {
    type Err = CorpusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        let bytes = normalized.as_bytes();
        let is_valid = bytes.len() == 3 && bytes.iter().all(|b| b.is_ascii_alphanumeric());
        if !is_valid {
            return Err(CorpusError::InvalidBookCode(value.to_string()));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }
}

impl Serialize for BookCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerseRef {
    pub book: BookCode,
    pub chapter: u32,
    pub verse: u32,
}

impl VerseRef {
    pub fn new(book: BookCode, chapter: u32, verse: u32) -> Self {
        Self {
            book,
            chapter,
            verse,
        }
    }
}

impl fmt::Display for VerseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.book, self.chapter, self.verse)
    }
}

impl Serialize for VerseRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for VerseRef {
    type Err = CorpusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || CorpusError::InvalidVerseRef(value.to_string());
        let (book, rest) = value.trim().split_once(' ').ok_or_else(invalid)?;
        let (chapter, verse) = rest.trim().split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            book: book.parse().map_err(|_| invalid())?,
            chapter: chapter.parse().map_err(|_| invalid())?,
            verse: verse.parse().map_err(|_| invalid())?,
        })
    }
}

/// Widest merged range accepted in source markup. Real merges span a few dozen verses.
pub const MAX_SPAN_WIDTH: u32 = 200;

/// Verse numbers covered by one source block: a single verse or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VerseSpan {
    pub first: u32,
    pub last: u32,
}

impl VerseSpan {
    pub fn single(verse: u32) -> Self {
        Self {
            first: verse,
            last: verse,
        }
    }

    pub fn range(first: u32, last: u32) -> Option<Self> {
        (first <= last && last - first < MAX_SPAN_WIDTH).then_some(Self { first, last })
    }

    pub fn is_range(&self) -> bool {
        self.last > self.first
    }

    pub fn verses(&self) -> impl Iterator<Item = u32> {
        self.first..=self.last
    }
}

impl fmt::Display for VerseSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_range() {
            write!(f, "{}-{}", self.first, self.last)
        } else {
            write!(f, "{}", self.first)
        }
    }
}

impl FromStr for VerseSpan {
    type Err = CorpusError;

    /// Accepts `3`, `3a`, `1-3`, `1a-3b` and en-dash ranges.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || CorpusError::InvalidVerseRef(value.to_string());
        let trimmed = value.trim();
        let (first, last) = match trimmed.split_once(['-', '\u{2013}']) {
            Some((first, last)) => (first, Some(last)),
            None => (trimmed, None),
        };
        let first = parse_verse_number(first).ok_or_else(invalid)?;
        match last {
            None => Ok(Self::single(first)),
            Some(last) => {
                let last = parse_verse_number(last).ok_or_else(invalid)?;
                Self::range(first, last).ok_or_else(invalid)
            }
        }
    }
}

fn parse_verse_number(value: &str) -> Option<u32> {
    let value = value.trim();
    let digits_end = value
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(digits_end);
    if digits.is_empty() || !suffix.chars().all(|ch| ch.is_ascii_lowercase()) || suffix.len() > 1
    {
        return None;
    }
    digits.parse().ok()
}
