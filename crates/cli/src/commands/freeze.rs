use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use nanosense_core::env_config::top_duplicates;
use nanosense_core::timestamp::require_timestamp;
use nanosense_storage::governance::{FreezeAuditOptions, run_freeze_audit};

use super::{Context, DEFAULT_REPORT_DIR, run_stamp};

#[derive(Debug, Args)]
pub(crate) struct FreezeArgs {
    /// Timestamp after which legacy tables must not receive writes
    #[arg(long)]
    freeze_after: Option<String>,
    /// Copy the database here before anything else
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    /// Dump spectra and analysis_results to CSV here
    #[arg(long)]
    export_csv_dir: Option<PathBuf>,
    /// Backfill legacy rows still missing structured pointers
    #[arg(long)]
    backfill_missing: bool,
    /// Report path [default: docs/reports/legacy_freeze_<stamp>.md]
    #[arg(long)]
    report_file: Option<PathBuf>,
    /// Exit with code 1 when warnings are present
    #[arg(long)]
    strict: bool,
}

pub(crate) fn run(ctx: &Context, args: &FreezeArgs) -> Result<ExitCode> {
    let freeze_after = args.freeze_after.as_deref().map(require_timestamp).transpose()?;
    let store = ctx.open()?;

    let report_file = args
        .report_file
        .clone()
        .unwrap_or_else(|| Path::new(DEFAULT_REPORT_DIR).join(format!("legacy_freeze_{}.md", run_stamp())));
    let options = FreezeAuditOptions {
        db_path: ctx.db_path.clone(),
        freeze_after,
        backup_dir: args.backup_dir.clone(),
        export_csv_dir: args.export_csv_dir.clone(),
        backfill_missing: args.backfill_missing,
        report_file: Some(report_file),
        top_n: top_duplicates(),
    };
    let report = run_freeze_audit(store.conn(), &options)?;

    ctx.emit(&report, || {
        let mut lines = Vec::new();
        if let Some(path) = &report.backup_path {
            lines.push(format!("Backup created at: {}", path.display()));
        }
        for path in &report.csv_exports {
            lines.push(format!("Exported: {}", path.display()));
        }
        if let Some(path) = &report.report_path {
            lines.push(format!("Report written to: {}", path.display()));
        }
        if report.warnings.is_empty() {
            lines.push("No warnings.".to_owned());
        } else {
            lines.extend(report.warnings.iter().map(|w| format!("WARNING: {w}")));
        }
        lines.join("\n")
    })?;

    Ok(if args.strict && report.has_warnings() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
