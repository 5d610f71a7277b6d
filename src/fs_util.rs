use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::CorpusError;

/// Checks that `zip_path` is a non-empty zip whose entries all decompress.
pub fn validate_zip(zip_path: &Path) -> Result<(), CorpusError> {
    let corrupt = |reason: String| CorpusError::CorruptArchive {
        path: zip_path.to_path_buf(),
        reason,
    };

    let size = fs::metadata(zip_path)
        .map_err(|err| corrupt(format!("unreadable: {err}")))?
        .len();
    if size == 0 {
        return Err(corrupt("zero-byte file".to_string()));
    }

    let file = fs::File::open(zip_path).map_err(|err| corrupt(format!("open: {err}")))?;
    let mut archive = ZipArchive::new(file).map_err(|err| corrupt(err.to_string()))?;
    if archive.is_empty() {
        return Err(corrupt("archive has no entries".to_string()));
    }

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| corrupt(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| corrupt(err.to_string()))?;
    }
    Ok(())
}

/// Extracts every entry of `zip_path` below `target_dir`, refusing entries that
/// would escape it.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, CorpusError> {
    let failed = |reason: String| CorpusError::Materialization {
        project: target_dir.to_path_buf(),
        reason,
    };

    let file = fs::File::open(zip_path)
        .map_err(|err| failed(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| failed(err.to_string()))?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| failed(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(failed(format!(
                    "zip entry path traversal detected: {}",
                    entry.name()
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| failed(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| failed(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path).map_err(|err| failed(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| failed(err.to_string()))?;
        files += 1;
    }
    Ok(files)
}
