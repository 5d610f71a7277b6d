use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CorpusError;
use crate::fs_util::extract_zip;
use crate::layout::{replace_dir, walk_dir};

const SOURCE_EXTENSIONS: [&str; 2] = ["usfm", "sfm"];

#[derive(Debug, Clone)]
pub struct Project {
    pub dir: PathBuf,
    pub documents: Vec<PathBuf>,
}

impl Project {
    pub fn open(dir: &Path) -> Result<Self, CorpusError> {
        let mut documents: Vec<PathBuf> = walk_dir(dir)?
            .into_iter()
            .filter(|path| path.is_file() && is_source_document(path))
            .collect();
        documents.sort();
        Ok(Self {
            dir: dir.to_path_buf(),
            documents,
        })
    }
}

fn is_source_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SOURCE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Replaces `project_dir` with the contents of `archive`. On failure the previous project is kept.
pub fn materialize(archive: &Path, project_dir: &Path) -> Result<Project, CorpusError> {
    let failed = |reason: String| CorpusError::Materialization {
        project: project_dir.to_path_buf(),
        reason,
    };

    let parent = project_dir
        .parent()
        .ok_or_else(|| failed("project directory has no parent".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| failed(err.to_string()))?;

    let staging = tempfile::Builder::new()
        .prefix(".ebible-unpack")
        .tempdir_in(parent)
        .map_err(|err| failed(err.to_string()))?;
    let staged_project = staging.path().join("project");
    fs::create_dir_all(&staged_project).map_err(|err| failed(err.to_string()))?;

    let extracted = extract_zip(archive, &staged_project).map_err(|err| match err {
        CorpusError::Materialization { reason, .. } => failed(reason),
        other => failed(other.to_string()),
    })?;
    strip_numeric_prefixes(&staged_project)?;

    let staged = Project::open(&staged_project)?;
    if staged.documents.is_empty() {
        return Err(failed(format!(
            "archive {} contains no USFM documents ({extracted} files)",
            archive.display()
        )));
    }

    replace_dir(&staged_project, project_dir).map_err(|err| failed(err.to_string()))?;
    tracing::debug!(
        project = %project_dir.display(),
        documents = staged.documents.len(),
        "Materialized project"
    );
    Project::open(project_dir)
}

/// `02-GENxyz.usfm` -> `GENxyz.usfm`.
fn strip_numeric_prefixes(dir: &Path) -> Result<(), CorpusError> {
    for path in walk_dir(dir)? {
        if !path.is_file() || !is_source_document(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(stripped) = strip_book_number(name) else {
            continue;
        };
        let target = path.with_file_name(stripped);
        if target.exists() {
            tracing::warn!(file = %path.display(), "Not renaming; target name already exists");
            continue;
        }
        fs::rename(&path, &target).map_err(|err| CorpusError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

pub(crate) fn strip_book_number(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    let numbered = bytes.len() > 3
        && bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[2] == b'-';
    numbered.then(|| &name[3..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_book_number_only_for_prefixed_names() {
        assert_eq!(strip_book_number("02-GENeng.usfm"), Some("GENeng.usfm"));
        assert_eq!(strip_book_number("GENeng.usfm"), None);
        assert_eq!(strip_book_number("1SAeng.usfm"), None);
    }
}
