use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use chrono::{Local, Utc};
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ebible_corpus::app::{App, RunSummary};
use ebible_corpus::config::{CliOverrides, ConfigLoader};
use ebible_corpus::ebible::EbibleHttpClient;
use ebible_corpus::error::CorpusError;
use ebible_corpus::layout::Layout;
use ebible_corpus::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "ebible")]
#[command(about = "Download eBible.org translations and extract a verse-aligned corpus")]
#[command(version)]
struct Cli {
    /// Data directory holding downloads, projects, corpus and metadata.
    data_dir: PathBuf,

    /// Only process translation ids matching this regular expression.
    #[arg(long)]
    filter: Option<String>,

    /// Reuse cached archives up to this many days old (default 14).
    #[arg(long = "max_zip_age_days")]
    max_zip_age_days: Option<u32>,

    /// Download every selected archive even when a fresh one is cached.
    #[arg(long = "force_download")]
    force_download: bool,

    /// Stop after downloading; do not unpack or align.
    #[arg(long = "download-only")]
    download_only: bool,

    /// Include translations that may not be redistributed.
    #[arg(long = "allow_non_redistributable")]
    allow_non_redistributable: bool,

    /// JSON config file (default: <data_dir>/ebible.json when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of translations processed in parallel.
    #[arg(long)]
    workers: Option<usize>,

    /// After a fresh download, keep only this many archives per translation.
    #[arg(long = "keep_latest_zips")]
    keep_latest_zips: Option<usize>,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(summary) => exit_code_for_summary(&summary),
        Err(report) => {
            eprintln!("{report:?}");
            match report.downcast_ref::<CorpusError>() {
                Some(error) => ExitCode::from(map_exit_code(error)),
                None => ExitCode::from(1),
            }
        }
    }
}

fn map_exit_code(error: &CorpusError) -> u8 {
    match error {
        CorpusError::EmptyCatalog
        | CorpusError::CatalogParse { .. }
        | CorpusError::ConfigRead(_)
        | CorpusError::ConfigParse(_)
        | CorpusError::InvalidFilter(_)
        | CorpusError::InvalidTranslationId(_)
        | CorpusError::ReferenceRead(_)
        | CorpusError::ReferenceParse { .. } => 2,
        error if error.is_network() => 3,
        _ => 1,
    }
}

/// A completed run still reports translations that failed.
fn exit_code_for_summary(summary: &RunSummary) -> ExitCode {
    if summary.failed.is_empty() {
        ExitCode::SUCCESS
    } else if summary.has_network_failures() {
        ExitCode::from(3)
    } else {
        ExitCode::from(1)
    }
}

fn init_logging(layout: &Layout) -> miette::Result<PathBuf> {
    let logs_dir = layout.logs_dir().into_std_path_buf();
    std::fs::create_dir_all(&logs_dir).into_diagnostic()?;
    let log_path = logs_dir.join(format!(
        "ebible_{}.log",
        Local::now().format("%Y_%m_%d-%H_%M")
    ));
    let log_file = File::create(&log_path).into_diagnostic()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();
    Ok(log_path)
}

fn run() -> miette::Result<RunSummary> {
    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let layout = Layout::from_path(&cli.data_dir)?;
    let log_path = init_logging(&layout)?;
    tracing::info!(data = %layout.root(), log = %log_path.display(), "Starting run");

    let overrides = CliOverrides {
        filter: cli.filter,
        max_zip_age_days: cli.max_zip_age_days,
        force_download: cli.force_download,
        download_only: cli.download_only,
        allow_non_redistributable: cli.allow_non_redistributable,
        workers: cli.workers,
        keep_latest_zips: cli.keep_latest_zips,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), &cli.data_dir, overrides)?;
    let client = EbibleHttpClient::from_config(&config)?;
    let app = App::new(layout, client, config);
    let today = Utc::now().date_naive();

    let summary = match output_mode {
        OutputMode::Json => {
            let summary = app.run(today, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
            summary
        }
        OutputMode::Human => {
            let summary = app.run(today, &TextOutput)?;
            TextOutput::print_summary(&summary).into_diagnostic()?;
            summary
        }
    };
    tracing::info!(
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        "Run finished"
    );
    Ok(summary)
}
