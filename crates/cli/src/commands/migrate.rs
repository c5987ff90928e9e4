use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::Context;

#[derive(Debug, Args)]
pub(crate) struct MigrateArgs {
    /// List pending migrations without applying them
    #[arg(long)]
    dry_run: bool,
    /// Show the applied state of every built-in migration
    #[arg(long, conflicts_with = "dry_run")]
    status: bool,
}

#[derive(Serialize)]
struct MigrateOutcome<'a> {
    dry_run: bool,
    migrations: &'a [String],
}

pub(crate) fn run(ctx: &Context, args: &MigrateArgs) -> Result<ExitCode> {
    let mut store = ctx.open()?;

    if args.status {
        let status = store.migration_status()?;
        ctx.emit(&status, || {
            status
                .iter()
                .map(|s| format!("{:<32} {}", s.id, s.applied_at.as_deref().unwrap_or("pending")))
                .collect::<Vec<_>>()
                .join("\n")
        })?;
        return Ok(ExitCode::SUCCESS);
    }

    let migrations = store.migrate(args.dry_run)?;
    ctx.emit(&MigrateOutcome { dry_run: args.dry_run, migrations: &migrations }, || {
        if migrations.is_empty() {
            return "Database is up to date.".to_owned();
        }
        let heading = if args.dry_run { "Pending migrations:" } else { "Applied migrations:" };
        std::iter::once(heading.to_owned())
            .chain(migrations.iter().map(|id| format!("  - {id}")))
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(ExitCode::SUCCESS)
}
