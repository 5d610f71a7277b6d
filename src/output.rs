use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::cache::DownloadAction;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

impl TextOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{CYAN}eBible corpus summary{RESET}")?;
        writeln!(
            out,
            "  catalog: {} records ({:?}), {} rejected rows",
            summary.catalog_records,
            summary.catalog,
            summary.rejected_rows.len()
        )?;
        writeln!(
            out,
            "  selected {}, excluded {}, not matching filter {}",
            summary.selected,
            summary.excluded.len(),
            summary.unmatched
        )?;

        let fetched = summary
            .succeeded
            .iter()
            .filter(|item| item.action == DownloadAction::Fetched)
            .count();
        writeln!(
            out,
            "{GREEN}  succeeded: {} ({fetched} downloaded, {} from cache){RESET}",
            summary.succeeded.len(),
            summary.succeeded.len() - fetched
        )?;
        for item in &summary.succeeded {
            let Some(stats) = item.stats else {
                continue;
            };
            let color = if item.warnings > 0 { YELLOW } else { GREEN };
            writeln!(
                out,
                "{color}    {} {}/{} verses, {} ranges, {} warnings{RESET}",
                item.id, stats.verses, stats.lines, stats.ranges, item.warnings
            )?;
            if let Some(versification) = item.versification {
                writeln!(out, "      versification: {versification}")?;
            }
        }

        if !summary.rejected_rows.is_empty() {
            writeln!(out, "{YELLOW}  rejected catalog rows:{RESET}")?;
            for row in &summary.rejected_rows {
                writeln!(out, "{YELLOW}    row {}: {}{RESET}", row.row, row.message)?;
            }
        }
        if !summary.excluded.is_empty() {
            writeln!(out, "{YELLOW}  excluded:{RESET}")?;
            for exclusion in &summary.excluded {
                writeln!(out, "{YELLOW}    {} ({:?}){RESET}", exclusion.id, exclusion.reason)?;
            }
        }
        if !summary.failed.is_empty() {
            writeln!(out, "{RED}  failed: {}{RESET}", summary.failed.len())?;
            for failure in &summary.failed {
                writeln!(
                    out,
                    "{RED}    {} [{:?}] {}{RESET}",
                    failure.id, failure.stage, failure.error
                )?;
            }
        }
        if !summary.not_in_catalog.is_empty() {
            writeln!(
                out,
                "{YELLOW}  cached archives no longer in the catalog (kept):{RESET}"
            )?;
            for id in &summary.not_in_catalog {
                writeln!(out, "{YELLOW}    {id}{RESET}")?;
            }
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        let id = event
            .translation
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or("-");
        let elapsed = event
            .elapsed
            .map(|elapsed| format!(" ({:.1}s)", elapsed.as_secs_f64()))
            .unwrap_or_default();
        eprintln!("{CYAN}{id}{RESET}: {}{elapsed}", event.message);
    }
}
