use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use nanosense_core::timestamp::now_timestamp;
use nanosense_storage::governance::{
    CleanupReport, SnapshotAnalysis, analyze, cleanup, render_governance_summary, write_reports,
};
use serde::Serialize;

use super::cleanup::CleanupArgs;
use super::report::{ReportArgs, analysis_lines};
use super::{Context, run_stamp};

#[derive(Debug, Args)]
pub(crate) struct GovernanceArgs {
    #[command(flatten)]
    report: ReportArgs,
    #[command(flatten)]
    cleanup: CleanupArgs,
    /// Only generate reports
    #[arg(long)]
    skip_cleanup: bool,
    /// Summary path [default: <output-dir>/snapshot_governance_<stamp>.md]
    #[arg(long)]
    summary_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct GovernanceOutcome<'a> {
    analysis: &'a SnapshotAnalysis,
    cleanup: Option<&'a CleanupReport>,
    files: &'a [PathBuf],
    summary_file: &'a PathBuf,
}

pub(crate) fn run(ctx: &Context, args: &GovernanceArgs) -> Result<ExitCode> {
    let policy = if args.skip_cleanup { None } else { Some(args.cleanup.policy()?) };
    let store = ctx.open()?;

    let analysis = analyze(store.conn(), args.report.top_n())?;
    let files = write_reports(&analysis, &args.report.output_dir)?.paths();

    let cleanup_report = match &policy {
        Some(policy) => Some(cleanup(store.conn(), policy)?),
        None => {
            tracing::info!("Cleanup skipped by flag");
            None
        },
    };

    let summary_file = args
        .summary_file
        .clone()
        .unwrap_or_else(|| args.report.output_dir.join(format!("snapshot_governance_{}.md", run_stamp())));
    if let Some(parent) = summary_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let summary = render_governance_summary(&ctx.db_path, &analysis, cleanup_report.as_ref(), &files, &now_timestamp());
    fs::write(&summary_file, summary)?;
    tracing::info!(path = %summary_file.display(), "Governance summary written");

    let outcome =
        GovernanceOutcome { analysis: &analysis, cleanup: cleanup_report.as_ref(), files: &files, summary_file: &summary_file };
    ctx.emit(&outcome, || {
        let mut lines = analysis_lines(&analysis);
        if let Some(report) = &cleanup_report {
            for outcome in &report.tables {
                lines.push(format!(
                    "cleanup {}: {} candidates, {} updated{}",
                    outcome.table,
                    outcome.candidates.len(),
                    outcome.updated_count,
                    if report.dry_run { " (dry-run)" } else { "" }
                ));
            }
        }
        lines.push(format!("Summary written to {}", summary_file.display()));
        lines.join("\n")
    })?;
    Ok(ExitCode::SUCCESS)
}
