use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("invalid translation id: {0}")]
    InvalidTranslationId(String),

    #[error("invalid book code: {0}")]
    InvalidBookCode(String),

    #[error("invalid verse reference: {0}")]
    InvalidVerseRef(String),

    #[error("invalid --filter pattern: {0}")]
    #[diagnostic(help("the filter is a regular expression matched against translation ids"))]
    InvalidFilter(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("malformed catalog row {row}: {message}")]
    CatalogParse { row: usize, message: String },

    #[error("catalog contains no usable records")]
    #[diagnostic(help("check that translations.csv downloaded completely and still has its header row"))]
    EmptyCatalog,

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("server returned status {status} for {url}")]
    FetchStatus { status: u16, url: String },

    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("failed to materialize project {project}: {reason}")]
    Materialization { project: PathBuf, reason: String },

    #[error("canonical reference line {line} is not `BOOK C:V`: {content}")]
    ReferenceParse { line: usize, content: String },

    #[error("failed to read canonical reference at {0}")]
    ReferenceRead(PathBuf),

    #[error("aligned output has {actual} lines, canonical reference has {expected}")]
    AlignmentLength { expected: usize, actual: usize },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CorpusError {
    pub fn is_network(&self) -> bool {
        matches!(self, CorpusError::Fetch(_) | CorpusError::FetchStatus { .. })
    }
}
