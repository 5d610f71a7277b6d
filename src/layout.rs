use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::TranslationId;
use crate::error::CorpusError;

#[derive(Debug, Clone)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn from_path(root: &Path) -> Result<Self, CorpusError> {
        let root = Utf8PathBuf::from_path_buf(root.to_path_buf())
            .map_err(|_| CorpusError::Filesystem("non-utf8 data directory".to_string()))?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> Utf8PathBuf {
        self.root.join("downloads")
    }

    pub fn projects_dir(&self, private: bool) -> Utf8PathBuf {
        if private {
            self.root.join("private_projects")
        } else {
            self.root.join("projects")
        }
    }

    pub fn corpus_dir(&self, private: bool) -> Utf8PathBuf {
        if private {
            self.root.join("private_corpus")
        } else {
            self.root.join("corpus")
        }
    }

    pub fn metadata_dir(&self) -> Utf8PathBuf {
        self.root.join("metadata")
    }

    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.root.join("logs")
    }

    pub fn catalog_path(&self) -> Utf8PathBuf {
        self.metadata_dir().join("translations.csv")
    }

    pub fn default_reference_path(&self) -> Utf8PathBuf {
        self.metadata_dir().join("vref.txt")
    }

    pub fn project_dir(&self, id: &TranslationId, private: bool) -> Utf8PathBuf {
        self.projects_dir(private).join(id.as_str())
    }

    /// `<languageCode>-<translationId>.txt` in the public or private corpus directory.
    pub fn corpus_path(&self, language: &str, id: &TranslationId, private: bool) -> Utf8PathBuf {
        self.corpus_dir(private).join(format!("{language}-{id}.txt"))
    }

    pub fn ensure(&self) -> Result<(), CorpusError> {
        for dir in [
            self.downloads_dir(),
            self.projects_dir(false),
            self.projects_dir(true),
            self.corpus_dir(false),
            self.corpus_dir(true),
            self.metadata_dir(),
            self.logs_dir(),
        ] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| CorpusError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }
}

pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), CorpusError> {
    let parent = path
        .parent()
        .ok_or_else(|| CorpusError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| CorpusError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".ebible-write")
        .tempfile_in(parent)
        .map_err(|err| CorpusError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| CorpusError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| CorpusError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| CorpusError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| CorpusError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

/// Moves `from` to `to`, replacing `to`. The previous `to` is kept aside until the
/// rename succeeds and restored if it fails.
pub fn replace_dir(from: &Path, to: &Path) -> io::Result<()> {
    if !to.exists() {
        return fs::rename(from, to);
    }
    let backup = backup_path(to);
    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }
    fs::rename(to, &backup)?;
    if let Err(err) = fs::rename(from, to) {
        fs::rename(&backup, to)?;
        return Err(err);
    }
    fs::remove_dir_all(&backup)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".previous");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = Layout::new(Utf8PathBuf::from("/data"));
        let id: TranslationId = "engkjv".parse().unwrap();

        assert!(layout.project_dir(&id, false).ends_with("projects/engkjv"));
        assert!(
            layout
                .project_dir(&id, true)
                .ends_with("private_projects/engkjv")
        );
        assert!(
            layout
                .corpus_path("eng", &id, false)
                .ends_with("corpus/eng-engkjv.txt")
        );
        assert!(layout.catalog_path().ends_with("metadata/translations.csv"));
    }

    #[test]
    fn replace_dir_swaps_contents() {
        let temp = tempfile::tempdir().unwrap();
        let old = temp.path().join("proj");
        let new = temp.path().join("staged");
        fs::create_dir_all(&old).unwrap();
        fs::write(old.join("stale.usfm"), b"old").unwrap();
        fs::create_dir_all(&new).unwrap();
        fs::write(new.join("GEN.usfm"), b"new").unwrap();

        replace_dir(&new, &old).unwrap();

        assert!(old.join("GEN.usfm").exists());
        assert!(!old.join("stale.usfm").exists());
        assert!(!new.exists());
        assert!(!backup_path(&old).exists());
    }
}
