use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::Context;

#[derive(Parser)]
#[command(name = "nanosense")]
#[command(about = "Schema migration and snapshot governance for the NanoSense spectral store", long_about = None)]
struct Cli {
    /// SQLite database file (overrides NANOSENSE_DB_PATH and ~/.nanosense/config.json)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Print the command result as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate(commands::migrate::MigrateArgs),
    /// Check that the migrated schema is complete
    Validate,
    /// Write snapshot duplicate/reference reports
    Report(commands::report::ReportArgs),
    /// Deactivate stale, unreferenced snapshot rows
    Cleanup(commands::cleanup::CleanupArgs),
    /// Report, clean up and summarise in one pass
    Governance(commands::governance::GovernanceArgs),
    /// Audit legacy tables for writes after the freeze threshold
    Freeze(commands::freeze::FreezeArgs),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context { db_path: config::resolve_db_path(cli.db)?, json: cli.json };
    tracing::debug!(db = %ctx.db_path.display(), "Database path resolved");

    match cli.command {
        Commands::Migrate(args) => commands::migrate::run(&ctx, &args),
        Commands::Validate => commands::validate::run(&ctx),
        Commands::Report(args) => commands::report::run(&ctx, &args),
        Commands::Cleanup(args) => commands::cleanup::run(&ctx, &args),
        Commands::Governance(args) => commands::governance::run(&ctx, &args),
        Commands::Freeze(args) => commands::freeze::run(&ctx, &args),
    }
}
