use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::TranslationId;
use crate::error::CorpusError;
use crate::layout::write_bytes_atomic;
use crate::usfm::VerseBlock;

pub const SETTINGS_FILE: &str = "Settings.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Versification {
    Original,
    Septuagint,
    Vulgate,
    English,
    RussianProtestant,
    RussianOrthodox,
}

impl Versification {
    /// Paratext's numeric code for the scheme.
    pub fn code(self) -> u8 {
        match self {
            Versification::Original => 1,
            Versification::Septuagint => 2,
            Versification::Vulgate => 3,
            Versification::English => 4,
            Versification::RussianProtestant => 5,
            Versification::RussianOrthodox => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Versification::Original => "Original",
            Versification::Septuagint => "Septuagint",
            Versification::Vulgate => "Vulgate",
            Versification::English => "English",
            Versification::RussianProtestant => "Russian Protestant",
            Versification::RussianOrthodox => "Russian Orthodox",
        }
    }
}

impl fmt::Display for Versification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Highest verse number the source gives for `book chapter`.
pub fn last_verse(blocks: &[VerseBlock], book: &str, chapter: u32) -> Option<u32> {
    blocks
        .iter()
        .filter(|block| block.book.as_str() == book && block.chapter == chapter)
        .map(|block| block.span.last)
        .max()
}

pub fn from_old_testament(
    dan_3: Option<u32>,
    dan_5: Option<u32>,
    dan_13: Option<u32>,
) -> Option<Versification> {
    match (dan_3?, dan_5, dan_13) {
        (30, _, _) => Some(Versification::English),
        (33, Some(30), _) => Some(Versification::Original),
        (33, Some(31), _) => Some(Versification::RussianProtestant),
        (97, _, _) => Some(Versification::Septuagint),
        (100, _, Some(65)) => Some(Versification::Vulgate),
        (100, _, _) => Some(Versification::RussianOrthodox),
        _ => None,
    }
}

pub fn from_new_testament(
    jhn_6: Option<u32>,
    act_19: Option<u32>,
    rom_16: Option<u32>,
) -> Option<Versification> {
    if jhn_6 == Some(72) {
        Some(Versification::Vulgate)
    } else if act_19 == Some(41) {
        Some(Versification::English)
    } else if rom_16 == Some(24) {
        // Russian Protestant numbers the NT the same way.
        Some(Versification::RussianOrthodox)
    } else if jhn_6 == Some(71) && act_19 == Some(40) {
        Some(Versification::Original)
    } else {
        None
    }
}

/// Falls back to English when no checkpoint is conclusive.
pub fn detect(blocks: &[VerseBlock]) -> Versification {
    let has_old_testament = blocks
        .iter()
        .any(|block| matches!(block.book.as_str(), "GEN" | "JON"));
    let from_daniel = if has_old_testament {
        from_old_testament(
            last_verse(blocks, "DAN", 3),
            last_verse(blocks, "DAN", 5),
            last_verse(blocks, "DAN", 13),
        )
    } else {
        None
    };
    from_daniel
        .or_else(|| {
            from_new_testament(
                last_verse(blocks, "JHN", 6),
                last_verse(blocks, "ACT", 19),
                last_verse(blocks, "ROM", 16),
            )
        })
        .unwrap_or(Versification::English)
}

pub fn settings_xml(versification: Versification, language_code: &str, id: &TranslationId) -> String {
    format!(
        "<ScriptureText>\n  <Versification>{}</Versification>\n  <LanguageIsoCode>{}:::</LanguageIsoCode>\n  <Naming BookNameForm=\"MAT\" PostPart=\"{}.usfm\" PrePart=\"\" />\n</ScriptureText>\n",
        versification.code(),
        xml_escape(language_code),
        xml_escape(id.as_str()),
    )
}

/// Writes `Settings.xml` into a materialized project and returns its path.
pub fn write_settings(
    project_dir: &Path,
    versification: Versification,
    language_code: &str,
    id: &TranslationId,
) -> Result<PathBuf, CorpusError> {
    let path = project_dir.join(SETTINGS_FILE);
    write_bytes_atomic(&path, settings_xml(versification, language_code, id).as_bytes())?;
    Ok(path)
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_paratext_numbering() {
        assert_eq!(Versification::Original.code(), 1);
        assert_eq!(Versification::RussianOrthodox.code(), 6);
        assert_eq!(Versification::RussianProtestant.to_string(), "Russian Protestant");
    }

    #[test]
    fn settings_xml_names_scheme_and_language() {
        let xml = settings_xml(Versification::Septuagint, "grc", &"grcbrent".parse().unwrap());
        assert!(xml.contains("<Versification>2</Versification>"));
        assert!(xml.contains("<LanguageIsoCode>grc:::</LanguageIsoCode>"));
        assert!(xml.contains("PostPart=\"grcbrent.usfm\""));
    }
}
