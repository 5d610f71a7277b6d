use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::RetentionPolicy;
use crate::domain::TranslationId;
use crate::error::CorpusError;

pub const DEFAULT_CATALOG_URL: &str = "https://ebible.org/Scriptures/translations.csv";
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://ebible.org/Scriptures/";
pub const DEFAULT_MIN_VERSES: u32 = 400;
pub const DEFAULT_MAX_ZIP_AGE_DAYS: u32 = 14;
pub const DEFAULT_WORKERS: usize = 4;
pub const CONFIG_FILE_NAME: &str = "ebible.json";

/// On-disk JSON configuration. Every key is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub archive_base_url: Option<String>,
    #[serde(default)]
    pub min_verses: Option<u32>,
    #[serde(default)]
    pub max_zip_age_days: Option<u32>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub fetch_delay_ms: Option<u64>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub retention: Option<RetentionEntry>,
    #[serde(default)]
    pub reference: Option<PathBuf>,
    #[serde(default)]
    pub tidy_empty_ranges: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionEntry {
    KeepAll,
    KeepLatest(usize),
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub filter: Option<String>,
    pub max_zip_age_days: Option<u32>,
    pub force_download: bool,
    pub download_only: bool,
    pub allow_non_redistributable: bool,
    pub workers: Option<usize>,
    pub keep_latest_zips: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub catalog_url: String,
    pub archive_base_url: String,
    pub min_verses: u32,
    pub max_zip_age_days: u32,
    pub workers: usize,
    pub fetch_timeout: Duration,
    pub fetch_delay: Duration,
    pub exclude: Vec<TranslationId>,
    pub retention: RetentionPolicy,
    pub reference: Option<PathBuf>,
    pub tidy_empty_ranges: bool,
    pub filter: Option<Regex>,
    pub force_download: bool,
    pub download_only: bool,
    pub allow_non_redistributable: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` if given, otherwise `<data_dir>/ebible.json` when present.
    pub fn resolve(
        path: Option<&Path>,
        data_dir: &Path,
        overrides: CliOverrides,
    ) -> Result<ResolvedConfig, CorpusError> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = data_dir.join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::read(&default_path)?
                } else {
                    Config::default()
                }
            }
        };
        Self::resolve_config(config, overrides)
    }

    fn read(path: &Path) -> Result<Config, CorpusError> {
        let content =
            fs::read_to_string(path).map_err(|_| CorpusError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| CorpusError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        config: Config,
        overrides: CliOverrides,
    ) -> Result<ResolvedConfig, CorpusError> {
        let filter = overrides
            .filter
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| CorpusError::InvalidFilter(err.to_string()))
            })
            .transpose()?;

        let exclude = config
            .exclude
            .iter()
            .map(|value| value.parse())
            .collect::<Result<Vec<TranslationId>, CorpusError>>()?;

        let retention = match (overrides.keep_latest_zips, config.retention) {
            (Some(keep), _) => RetentionPolicy::KeepLatest(keep.max(1)),
            (None, Some(RetentionEntry::KeepLatest(keep))) => {
                RetentionPolicy::KeepLatest(keep.max(1))
            }
            (None, Some(RetentionEntry::KeepAll) | None) => RetentionPolicy::KeepAll,
        };

        let workers = overrides
            .workers
            .or(config.workers)
            .unwrap_or(DEFAULT_WORKERS)
            .max(1);

        Ok(ResolvedConfig {
            catalog_url: config
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            archive_base_url: config
                .archive_base_url
                .unwrap_or_else(|| DEFAULT_ARCHIVE_BASE_URL.to_string()),
            min_verses: config.min_verses.unwrap_or(DEFAULT_MIN_VERSES),
            max_zip_age_days: overrides
                .max_zip_age_days
                .or(config.max_zip_age_days)
                .unwrap_or(DEFAULT_MAX_ZIP_AGE_DAYS),
            workers,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs.unwrap_or(120)),
            fetch_delay: Duration::from_millis(config.fetch_delay_ms.unwrap_or(1000)),
            exclude,
            retention,
            reference: config.reference,
            tidy_empty_ranges: config.tidy_empty_ranges.unwrap_or(false),
            filter,
            force_download: overrides.force_download,
            download_only: overrides.download_only,
            allow_non_redistributable: overrides.allow_non_redistributable,
        })
    }
}
