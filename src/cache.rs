use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::TranslationId;
use crate::ebible::EbibleClient;
use crate::error::CorpusError;
use crate::fs_util::validate_zip;

pub const ARCHIVE_EXTENSION: &str = "zip";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    pub id: TranslationId,
    pub date: NaiveDate,
}

impl ArchiveName {
    pub fn new(id: TranslationId, date: NaiveDate) -> Self {
        Self { id, date }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}--{}.{ARCHIVE_EXTENSION}",
            self.id,
            self.date.format(DATE_FORMAT)
        )
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(&format!(".{ARCHIVE_EXTENSION}"))?;
        let (id, date) = stem.rsplit_once("--")?;
        Some(Self {
            id: id.parse().ok()?,
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub id: TranslationId,
    pub downloaded: NaiveDate,
    pub path: PathBuf,
}

impl CacheEntry {
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.downloaded).num_days()
    }

    /// An archive exactly `max_age_days` old is still fresh.
    pub fn is_fresh(&self, today: NaiveDate, max_age_days: u32) -> bool {
        self.age_days(today) <= i64::from(max_age_days)
    }
}

pub fn list_entries(cache_dir: &Path, id: &TranslationId) -> Result<Vec<CacheEntry>, CorpusError> {
    let mut entries: Vec<CacheEntry> = scan(cache_dir)?
        .into_iter()
        .filter(|(name, _)| &name.id == id)
        .map(|(name, path)| CacheEntry {
            id: name.id,
            downloaded: name.date,
            path,
        })
        .collect();
    entries.sort_by(|a, b| a.downloaded.cmp(&b.downloaded).then(a.path.cmp(&b.path)));
    Ok(entries)
}

pub fn cached_ids(cache_dir: &Path) -> Result<BTreeSet<TranslationId>, CorpusError> {
    Ok(scan(cache_dir)?.into_iter().map(|(name, _)| name.id).collect())
}

fn scan(cache_dir: &Path) -> Result<Vec<(ArchiveName, PathBuf)>, CorpusError> {
    if !cache_dir.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    let entries = fs::read_dir(cache_dir)
        .map_err(|err| CorpusError::Filesystem(format!("read {}: {err}", cache_dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|err| CorpusError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Some(parsed) = ArchiveName::parse(name) {
            found.push((parsed, path));
        }
    }
    Ok(found)
}

/// What happens to older archives of an id after a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    KeepAll,
    KeepLatest(usize),
}

impl RetentionPolicy {
    /// Removes archives of `id` beyond the policy, never touching `keep`.
    pub fn prune(
        &self,
        cache_dir: &Path,
        id: &TranslationId,
        keep: &Path,
    ) -> Result<Vec<PathBuf>, CorpusError> {
        let RetentionPolicy::KeepLatest(count) = *self else {
            return Ok(Vec::new());
        };
        let entries = list_entries(cache_dir, id)?;
        let surplus = entries.len().saturating_sub(count.max(1));
        let mut removed = Vec::new();
        for entry in entries.into_iter().take(surplus) {
            if entry.path == keep {
                continue;
            }
            fs::remove_file(&entry.path).map_err(|err| {
                CorpusError::Filesystem(format!("remove {}: {err}", entry.path.display()))
            })?;
            removed.push(entry.path);
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub max_age_days: u32,
    pub force: bool,
    pub today: NaiveDate,
    pub retention: RetentionPolicy,
    pub fetch_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadAction {
    Reused,
    Fetched,
}

#[derive(Debug, Clone, Serialize)]
pub struct Download {
    pub entry: CacheEntry,
    pub action: DownloadAction,
    pub pruned: Vec<PathBuf>,
}

pub struct Downloader<'a, C: EbibleClient + ?Sized> {
    client: &'a C,
    cache_dir: PathBuf,
}

impl<'a, C: EbibleClient + ?Sized> Downloader<'a, C> {
    pub fn new(client: &'a C, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    /// Returns an archive for `id` no older than `max_age_days`, fetching only
    /// when the newest cached archive is missing, stale or unreadable.
    pub fn fetch(
        &self,
        id: &TranslationId,
        options: &DownloadOptions,
    ) -> Result<Download, CorpusError> {
        if !options.force {
            if let Some(latest) = list_entries(&self.cache_dir, id)?.pop() {
                if latest.is_fresh(options.today, options.max_age_days) {
                    match validate_zip(&latest.path) {
                        Ok(()) => {
                            tracing::debug!(
                                translation = %id,
                                age_days = latest.age_days(options.today),
                                "Reusing cached archive"
                            );
                            return Ok(Download {
                                entry: latest,
                                action: DownloadAction::Reused,
                                pruned: Vec::new(),
                            });
                        }
                        Err(err) => {
                            tracing::warn!(translation = %id, error = %err, "Cached archive unusable; refetching");
                        }
                    }
                } else {
                    tracing::debug!(
                        translation = %id,
                        age_days = latest.age_days(options.today),
                        "Cached archive is stale"
                    );
                }
            }
        }

        let entry = self.fetch_fresh(id, options.today)?;
        let pruned = options.retention.prune(&self.cache_dir, id, &entry.path)?;
        if !options.fetch_delay.is_zero() {
            thread::sleep(options.fetch_delay);
        }
        Ok(Download {
            entry,
            action: DownloadAction::Fetched,
            pruned,
        })
    }

    fn fetch_fresh(&self, id: &TranslationId, today: NaiveDate) -> Result<CacheEntry, CorpusError> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|err| CorpusError::Filesystem(err.to_string()))?;
        // Staged under a dotted name so a partial download never parses as an archive.
        let staged = tempfile::Builder::new()
            .prefix(&format!(".{id}-"))
            .suffix(".part")
            .tempfile_in(&self.cache_dir)
            .map_err(|err| CorpusError::Filesystem(err.to_string()))?;

        let bytes = self.client.download_archive(id, staged.path())?;
        validate_zip(staged.path()).map_err(|err| match err {
            CorpusError::CorruptArchive { reason, .. } => CorpusError::CorruptArchive {
                path: PathBuf::from(ArchiveName::new(id.clone(), today).file_name()),
                reason,
            },
            other => other,
        })?;

        let path = self
            .cache_dir
            .join(ArchiveName::new(id.clone(), today).file_name());
        staged
            .persist(&path)
            .map_err(|err| CorpusError::Filesystem(err.to_string()))?;
        tracing::info!(translation = %id, bytes, path = %path.display(), "Downloaded archive");
        Ok(CacheEntry {
            id: id.clone(),
            downloaded: today,
            path,
        })
    }
}
