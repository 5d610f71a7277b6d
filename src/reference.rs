use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::domain::VerseRef;
use crate::error::CorpusError;

/// The fixed verse order every corpus file is aligned to, one `BOOK C:V` per line.
#[derive(Debug, Clone)]
pub struct CanonicalReference {
    verses: Vec<VerseRef>,
    members: HashSet<VerseRef>,
}

impl CanonicalReference {
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let content =
            fs::read_to_string(path).map_err(|_| CorpusError::ReferenceRead(path.to_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CorpusError> {
        let verses = content
            .trim_start_matches('\u{feff}')
            .lines()
            .enumerate()
            .map(|(index, line)| {
                line.trim_end_matches('\r')
                    .parse::<VerseRef>()
                    .map_err(|_| CorpusError::ReferenceParse {
                        line: index + 1,
                        content: line.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_verses(verses))
    }

    pub fn from_verses(verses: Vec<VerseRef>) -> Self {
        let members = verses.iter().copied().collect();
        Self { verses, members }
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    pub fn contains(&self, verse: &VerseRef) -> bool {
        self.members.contains(verse)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerseRef> {
        self.verses.iter()
    }
}
