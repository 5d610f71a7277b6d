use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::Serialize;

use crate::align::{CorpusStats, align, tidy_empty_ranges, write_corpus};
use crate::cache::{DownloadAction, DownloadOptions, Downloader, cached_ids};
use crate::catalog::{Catalog, CatalogFilter, Exclusion, RejectedRow, TranslationRecord};
use crate::config::ResolvedConfig;
use crate::domain::TranslationId;
use crate::ebible::EbibleClient;
use crate::error::CorpusError;
use crate::layout::Layout;
use crate::project::materialize;
use crate::reference::CanonicalReference;
use crate::usfm::parse_project;
use crate::versification::{Versification, detect, write_settings};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub translation: Option<TranslationId>,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Materialize,
    Align,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub id: TranslationId,
    pub language_code: String,
    pub private: bool,
    pub action: DownloadAction,
    pub archive: PathBuf,
    pub pruned: Vec<PathBuf>,
    pub corpus: Option<PathBuf>,
    pub versification: Option<Versification>,
    pub stats: Option<CorpusStats>,
    pub tidied_ranges: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub id: TranslationId,
    pub stage: Stage,
    pub error: String,
    #[serde(skip)]
    pub network: bool,
}

#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Succeeded(ItemReport),
    Failed(ItemFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    Downloaded,
    Cached,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub catalog: CatalogSource,
    pub catalog_records: usize,
    pub rejected_rows: Vec<RejectedRow>,
    pub excluded: Vec<Exclusion>,
    pub unmatched: usize,
    pub selected: usize,
    pub download_only: bool,
    pub succeeded: Vec<ItemReport>,
    pub failed: Vec<ItemFailure>,
    /// Cached archives whose translation has left the catalog. Never deleted.
    pub not_in_catalog: Vec<TranslationId>,
}

pub struct App<C: EbibleClient> {
    layout: Layout,
    client: C,
    config: ResolvedConfig,
}

impl<C: EbibleClient> App<C> {
    pub fn new(layout: Layout, client: C, config: ResolvedConfig) -> Self {
        Self {
            layout,
            client,
            config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(&self, today: NaiveDate, sink: &dyn ProgressSink) -> Result<RunSummary, CorpusError> {
        self.layout.ensure()?;

        let catalog_source = self.refresh_catalog(today)?;
        let catalog_path = self.layout.catalog_path();
        let file = fs::File::open(catalog_path.as_std_path())
            .map_err(|err| CorpusError::Filesystem(format!("open {catalog_path}: {err}")))?;
        let catalog = Catalog::parse(file)?;

        let filter = CatalogFilter {
            min_verses: self.config.min_verses,
            include: self.config.filter.clone(),
            allow_non_redistributable: self.config.allow_non_redistributable,
            exclude: self.config.exclude.clone(),
        };
        let outcome = filter.apply(&catalog.records);
        tracing::info!(
            records = catalog.records.len(),
            rejected = catalog.rejected.len(),
            selected = outcome.selected.len(),
            excluded = outcome.excluded.len(),
            unmatched = outcome.unmatched,
            "Catalog filtered"
        );

        let reference = if self.config.download_only {
            None
        } else {
            let path = self
                .config
                .reference
                .clone()
                .unwrap_or_else(|| self.layout.default_reference_path().into_std_path_buf());
            let reference = CanonicalReference::load(&path)?;
            tracing::info!(path = %path.display(), verses = reference.len(), "Loaded canonical reference");
            Some(reference)
        };

        let options = DownloadOptions {
            max_age_days: self.config.max_zip_age_days,
            force: self.config.force_download,
            today,
            retention: self.config.retention,
            fetch_delay: self.config.fetch_delay,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|index| format!("ebible-worker-{index}"))
            .build()
            .map_err(|err| CorpusError::Filesystem(format!("worker pool: {err}")))?;
        let outcomes: Vec<ItemOutcome> = pool.install(|| {
            outcome
                .selected
                .par_iter()
                .map(|record| self.process(record, reference.as_ref(), &options, sink))
                .collect()
        });

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for item in outcomes {
            match item {
                ItemOutcome::Succeeded(report) => succeeded.push(report),
                ItemOutcome::Failed(failure) => failed.push(failure),
            }
        }

        let known: Vec<&TranslationId> = catalog.records.iter().map(|record| &record.id).collect();
        let not_in_catalog = cached_ids(self.layout.downloads_dir().as_std_path())?
            .into_iter()
            .filter(|id| !known.contains(&id))
            .collect();

        Ok(RunSummary {
            catalog: catalog_source,
            catalog_records: catalog.records.len(),
            rejected_rows: catalog.rejected,
            excluded: outcome.excluded,
            unmatched: outcome.unmatched,
            selected: outcome.selected.len(),
            download_only: self.config.download_only,
            succeeded,
            failed,
            not_in_catalog,
        })
    }

    fn refresh_catalog(&self, today: NaiveDate) -> Result<CatalogSource, CorpusError> {
        let path = self.layout.catalog_path().into_std_path_buf();
        let age_days = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(|modified| (today - DateTime::<Utc>::from(modified).date_naive()).num_days());

        let stale = match age_days {
            None => true,
            Some(age) => age > i64::from(self.config.max_zip_age_days),
        };
        if !stale && !self.config.force_download {
            tracing::debug!(path = %path.display(), "Using cached catalog");
            return Ok(CatalogSource::Cached);
        }

        let staged = tempfile::Builder::new()
            .prefix(".translations-")
            .suffix(".part")
            .tempfile_in(self.layout.metadata_dir().as_std_path())
            .map_err(|err| CorpusError::Filesystem(err.to_string()))?;
        let fetched = self
            .client
            .download_catalog(staged.path())
            .and_then(|()| {
                staged
                    .persist(&path)
                    .map(|_| ())
                    .map_err(|err| CorpusError::Filesystem(err.to_string()))
            });
        match fetched {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Downloaded catalog");
                Ok(CatalogSource::Downloaded)
            }
            Err(err) if age_days.is_some() => {
                tracing::warn!(error = %err, "Catalog refresh failed; using the existing copy");
                Ok(CatalogSource::Fallback)
            }
            Err(err) => Err(err),
        }
    }

    fn process(
        &self,
        record: &TranslationRecord,
        reference: Option<&CanonicalReference>,
        options: &DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> ItemOutcome {
        let start = Instant::now();
        let id = &record.id;
        let failed = |stage: Stage, err: CorpusError| {
            tracing::warn!(translation = %id, ?stage, error = %err, "Translation failed");
            sink.event(ProgressEvent {
                translation: Some(id.clone()),
                message: format!("failed during {stage:?}: {err}"),
                elapsed: Some(start.elapsed()),
            });
            ItemOutcome::Failed(ItemFailure {
                id: id.clone(),
                stage,
                network: err.is_network(),
                error: err.to_string(),
            })
        };

        let downloader = Downloader::new(&self.client, self.layout.downloads_dir().as_std_path());
        let download = match downloader.fetch(id, options) {
            Ok(download) => download,
            Err(err) => return failed(Stage::Download, err),
        };
        let private = !record.redistributable;
        let mut report = ItemReport {
            id: id.clone(),
            language_code: record.language_code.clone(),
            private,
            action: download.action,
            archive: download.entry.path.clone(),
            pruned: download.pruned,
            corpus: None,
            versification: None,
            stats: None,
            tidied_ranges: 0,
            warnings: 0,
        };

        let Some(reference) = reference else {
            sink.event(ProgressEvent {
                translation: Some(id.clone()),
                message: format!("{:?} archive", download.action).to_lowercase(),
                elapsed: Some(start.elapsed()),
            });
            return ItemOutcome::Succeeded(report);
        };

        let project_dir = self.layout.project_dir(id, private);
        let project = match materialize(&download.entry.path, project_dir.as_std_path()) {
            Ok(project) => project,
            Err(err) => return failed(Stage::Materialize, err),
        };

        let mut warnings = Vec::new();
        let blocks = parse_project(&project, &mut warnings);
        let versification = detect(&blocks);
        if let Err(err) = write_settings(&project.dir, versification, &record.language_code, id) {
            return failed(Stage::Materialize, err);
        }
        tracing::debug!(translation = %id, %versification, "Detected versification");
        report.versification = Some(versification);
        let mut alignment = match align(&blocks, reference) {
            Ok(alignment) => alignment,
            Err(err) => return failed(Stage::Align, err),
        };
        warnings.append(&mut alignment.warnings);
        if self.config.tidy_empty_ranges {
            report.tidied_ranges = tidy_empty_ranges(&mut alignment.lines);
        }

        let corpus_path = self
            .layout
            .corpus_path(&record.language_code, id, private)
            .into_std_path_buf();
        if let Err(err) = write_corpus(&corpus_path, &alignment.lines) {
            return failed(Stage::Align, err);
        }

        for warning in &warnings {
            tracing::debug!(translation = %id, %warning, "Alignment warning");
        }
        let stats = alignment.stats();
        if warnings.is_empty() {
            tracing::info!(translation = %id, verses = stats.verses, path = %corpus_path.display(), "Wrote corpus file");
        } else {
            tracing::warn!(
                translation = %id,
                verses = stats.verses,
                warnings = warnings.len(),
                path = %corpus_path.display(),
                "Wrote corpus file with alignment warnings"
            );
        }

        report.corpus = Some(corpus_path);
        report.stats = Some(stats);
        report.warnings = warnings.len();
        sink.event(ProgressEvent {
            translation: Some(id.clone()),
            message: format!("{} verses, {} warnings", stats.verses, report.warnings),
            elapsed: Some(start.elapsed()),
        });
        ItemOutcome::Succeeded(report)
    }
}

impl RunSummary {
    pub fn has_network_failures(&self) -> bool {
        self.failed.iter().any(|failure| failure.network)
    }
}
