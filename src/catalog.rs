use std::collections::HashMap;
use std::io::Read;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::TranslationId;
use crate::error::CorpusError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationRecord {
    pub id: TranslationId,
    pub language_code: String,
    pub verse_count: u32,
    pub downloadable: bool,
    pub redistributable: bool,
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogRow {
    #[serde(rename = "translationId")]
    translation_id: Option<String>,
    #[serde(rename = "languageCode")]
    language_code: Option<String>,
    #[serde(rename = "OTverses")]
    ot_verses: Option<String>,
    #[serde(rename = "NTverses")]
    nt_verses: Option<String>,
    #[serde(rename = "DCverses")]
    dc_verses: Option<String>,
    downloadable: Option<String>,
    #[serde(rename = "Redistributable")]
    redistributable: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub records: Vec<TranslationRecord>,
    pub rejected: Vec<RejectedRow>,
}

impl Catalog {
    pub fn parse<R: Read>(mut reader: R) -> Result<Self, CorpusError> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|err| CorpusError::Filesystem(format!("read catalog: {err}")))?;
        let content = content.trim_start_matches('\u{feff}');

        let mut csv = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut records = Vec::new();
        let mut rejected = Vec::new();
        for (index, row) in csv.deserialize::<CatalogRow>().enumerate() {
            // Header is line 1, so the first data row is line 2.
            let line = index + 2;
            let parsed = row
                .map_err(|err| CorpusError::CatalogParse {
                    row: line,
                    message: err.to_string(),
                })
                .and_then(|row| row.into_record(line));
            match parsed {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(row = line, error = %err, "Skipping malformed catalog row");
                    rejected.push(RejectedRow {
                        row: line,
                        message: err.to_string(),
                    });
                }
            }
        }

        if records.is_empty() {
            return Err(CorpusError::EmptyCatalog);
        }
        Ok(Self { records, rejected })
    }
}

impl CatalogRow {
    fn into_record(self, row: usize) -> Result<TranslationRecord, CorpusError> {
        let malformed = |message: String| CorpusError::CatalogParse { row, message };

        let id = required(self.translation_id, "translationId").map_err(malformed)?;
        let id: TranslationId = id.parse().map_err(|err: CorpusError| malformed(err.to_string()))?;
        let language_code = required(self.language_code, "languageCode").map_err(malformed)?;
        let downloadable = parse_flag(required(self.downloadable, "downloadable").map_err(malformed)?)
            .map_err(malformed)?;
        let redistributable =
            parse_flag(required(self.redistributable, "Redistributable").map_err(malformed)?)
                .map_err(malformed)?;

        let counts = [
            ("OTverses", self.ot_verses),
            ("NTverses", self.nt_verses),
            ("DCverses", self.dc_verses),
        ];
        if counts.iter().all(|(_, value)| present(value).is_none()) {
            return Err(malformed("missing verse counts".to_string()));
        }
        let mut verse_count = 0u32;
        for (column, value) in counts {
            if let Some(value) = present(&value) {
                let count: u32 = value
                    .parse()
                    .map_err(|_| malformed(format!("{column} is not a number: {value}")))?;
                verse_count = verse_count.saturating_add(count);
            }
        }

        Ok(TranslationRecord {
            id,
            language_code,
            verse_count,
            downloadable,
            redistributable,
            title: present(&self.title).map(str::to_string),
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn required(value: Option<String>, column: &str) -> Result<String, String> {
    present(&value)
        .map(str::to_string)
        .ok_or_else(|| format!("missing {column}"))
}

fn parse_flag(value: String) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(format!("not a boolean: {value}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    TooFewVerses { verses: u32, minimum: u32 },
    NotDownloadable,
    NotRedistributable,
    Configured,
}

#[derive(Debug, Clone, Serialize)]
pub struct Exclusion {
    pub id: TranslationId,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub selected: Vec<TranslationRecord>,
    pub excluded: Vec<Exclusion>,
    /// Records that passed exclusion but did not match the inclusion pattern.
    pub unmatched: usize,
}

#[derive(Debug, Clone)]
pub struct CatalogFilter {
    pub min_verses: u32,
    pub include: Option<Regex>,
    pub allow_non_redistributable: bool,
    pub exclude: Vec<TranslationId>,
}

impl CatalogFilter {
    /// Selects in-scope records in catalog order. Duplicate ids keep only their
    /// last occurrence, which also determines their position.
    pub fn apply(&self, records: &[TranslationRecord]) -> FilterOutcome {
        let mut last_index = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            last_index.insert(&record.id, index);
        }

        let mut outcome = FilterOutcome::default();
        for (index, record) in records.iter().enumerate() {
            if last_index.get(&record.id) != Some(&index) {
                continue;
            }
            if let Some(reason) = self.exclusion_reason(record) {
                outcome.excluded.push(Exclusion {
                    id: record.id.clone(),
                    reason,
                });
                continue;
            }
            let included = self
                .include
                .as_ref()
                .map(|pattern| pattern.is_match(record.id.as_str()))
                .unwrap_or(true);
            if included {
                outcome.selected.push(record.clone());
            } else {
                outcome.unmatched += 1;
            }
        }
        outcome
    }

    fn exclusion_reason(&self, record: &TranslationRecord) -> Option<ExclusionReason> {
        if self.exclude.contains(&record.id) {
            return Some(ExclusionReason::Configured);
        }
        if record.verse_count < self.min_verses {
            return Some(ExclusionReason::TooFewVerses {
                verses: record.verse_count,
                minimum: self.min_verses,
            });
        }
        if !record.downloadable {
            return Some(ExclusionReason::NotDownloadable);
        }
        if !record.redistributable && !self.allow_non_redistributable {
            return Some(ExclusionReason::NotRedistributable);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const HEADER: &str =
        "languageCode,translationId,title,Redistributable,OTverses,NTverses,DCverses,downloadable";

    #[test]
    fn parse_sums_verse_columns() {
        let csv = format!("{HEADER}\neng,engkjv,King James,True,23145,7957,0,True\n");
        let catalog = Catalog::parse(csv.as_bytes()).unwrap();
        assert_eq!(catalog.records.len(), 1);
        assert_eq!(catalog.records[0].verse_count, 31102);
        assert!(catalog.records[0].redistributable);
    }

    #[test]
    fn parse_strips_byte_order_mark() {
        let csv = format!("\u{feff}{HEADER}\neng,engkjv,,True,0,7957,,True\n");
        let catalog = Catalog::parse(csv.as_bytes()).unwrap();
        assert_eq!(catalog.records[0].id.as_str(), "engkjv");
    }

    #[test]
    fn parse_without_usable_rows_is_fatal() {
        let csv = "something,else\n1,2\n";
        let err = Catalog::parse(csv.as_bytes()).unwrap_err();
        assert_matches!(err, CorpusError::EmptyCatalog);
    }
}
