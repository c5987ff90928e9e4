use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use nanosense_core::env_config::top_duplicates;
use nanosense_storage::governance::{SnapshotAnalysis, analyze, write_reports};
use serde::Serialize;

use super::{Context, DEFAULT_REPORT_DIR};

#[derive(Debug, Args)]
pub(crate) struct ReportArgs {
    /// Directory for snapshot_report.md and the CSV summaries
    #[arg(long, default_value = DEFAULT_REPORT_DIR)]
    pub output_dir: PathBuf,
    /// Duplicate fingerprints listed per table [default: NANOSENSE_TOP_DUPLICATES or 10]
    #[arg(long)]
    pub top: Option<usize>,
}

impl ReportArgs {
    pub(crate) fn top_n(&self) -> usize {
        self.top.unwrap_or_else(top_duplicates)
    }
}

#[derive(Serialize)]
struct ReportOutcome<'a> {
    analysis: &'a SnapshotAnalysis,
    files: Vec<PathBuf>,
}

pub(crate) fn run(ctx: &Context, args: &ReportArgs) -> Result<ExitCode> {
    let store = ctx.open()?;
    let analysis = analyze(store.conn(), args.top_n())?;
    let files = write_reports(&analysis, &args.output_dir)?.paths();

    ctx.emit(&ReportOutcome { analysis: &analysis, files: files.clone() }, || {
        let mut lines = analysis_lines(&analysis);
        lines.push("Reports written:".to_owned());
        lines.extend(files.iter().map(|p| format!("  - {}", p.display())));
        lines.join("\n")
    })?;
    Ok(ExitCode::SUCCESS)
}

/// One line per snapshot table.
pub(crate) fn analysis_lines(analysis: &SnapshotAnalysis) -> Vec<String> {
    analysis
        .tables()
        .into_iter()
        .map(|(table, stats)| match stats {
            None => format!("{table}: table missing"),
            Some(s) => format!(
                "{table}: total={} unique={} duplicates={} unreferenced={}",
                s.total_records, s.unique_fingerprints, s.duplicate_records, s.unreferenced_records
            ),
        })
        .collect()
}
