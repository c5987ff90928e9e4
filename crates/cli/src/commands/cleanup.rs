use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Result;
use clap::Args;
use nanosense_core::env_config::cleanup_age_days;
use nanosense_core::timestamp::require_timestamp;
use nanosense_storage::SnapshotTable;
use nanosense_storage::governance::{CleanupPolicy, CleanupReport, CleanupStatus, Cutoff, cleanup, format_candidates};

use super::Context;

#[derive(Debug, Args)]
pub(crate) struct CleanupArgs {
    /// Minimum age in days [default: NANOSENSE_CLEANUP_AGE_DAYS or 180]
    #[arg(long, visible_alias = "days")]
    pub age_days: Option<i64>,
    /// Only rows stamped at or before this timestamp (overrides --age-days)
    #[arg(long)]
    pub before: Option<String>,
    /// Skip rows stamped before this timestamp
    #[arg(long)]
    pub window_start: Option<String>,
    /// Hard upper bound (overrides --before)
    #[arg(long)]
    pub window_end: Option<String>,
    /// Limit cleanup to a table; repeatable
    #[arg(long = "table", value_parser = SnapshotTable::from_str)]
    pub tables: Vec<SnapshotTable>,
    /// Preview candidates without updating is_active
    #[arg(long)]
    pub dry_run: bool,
}

impl CleanupArgs {
    pub(crate) fn policy(&self) -> Result<CleanupPolicy> {
        let cutoff = match self.window_end.as_deref().or(self.before.as_deref()) {
            Some(raw) => Cutoff::At(require_timestamp(raw)?),
            None => Cutoff::AgeDays(self.age_days.unwrap_or_else(cleanup_age_days)),
        };
        let window_start = self.window_start.as_deref().map(require_timestamp).transpose()?;
        Ok(CleanupPolicy { cutoff, window_start, tables: self.tables.clone(), dry_run: self.dry_run })
    }
}

pub(crate) fn run(ctx: &Context, args: &CleanupArgs) -> Result<ExitCode> {
    let policy = args.policy()?;
    let store = ctx.open()?;
    let report = cleanup(store.conn(), &policy)?;
    ctx.emit(&report, || render(&report))?;
    Ok(ExitCode::SUCCESS)
}

fn render(report: &CleanupReport) -> String {
    let mut lines = vec![format!(
        "Cleanup {} (cutoff {}{})",
        if report.dry_run { "dry-run" } else { "applied" },
        report.cutoff,
        report.window_start.as_deref().map(|s| format!(", window start {s}")).unwrap_or_default()
    )];
    for outcome in &report.tables {
        match outcome.status {
            CleanupStatus::TableMissing => lines.push(format!("{}: table missing, skipped", outcome.table)),
            CleanupStatus::NoSoftDelete => {
                lines.push(format!("{}: no is_active column, skipped", outcome.table));
            },
            CleanupStatus::Processed => {
                lines.push(format!(
                    "{}: {} candidates, {} updated",
                    outcome.table,
                    outcome.candidates.len(),
                    outcome.updated_count
                ));
                lines.push(format_candidates(&outcome.candidates));
            },
        }
    }
    lines.join("\n")
}
