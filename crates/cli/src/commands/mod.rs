pub(crate) mod cleanup;
pub(crate) mod freeze;
pub(crate) mod governance;
pub(crate) mod migrate;
pub(crate) mod report;
pub(crate) mod validate;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use nanosense_storage::Store;
use serde::Serialize;

/// Default directory for generated reports.
pub(crate) const DEFAULT_REPORT_DIR: &str = "docs/reports";

/// Resolved global options shared by every subcommand.
pub(crate) struct Context {
    pub db_path: PathBuf,
    pub json: bool,
}

impl Context {
    /// Open the configured store without migrating it.
    pub(crate) fn open(&self) -> Result<Store> {
        Store::open_existing(&self.db_path).with_context(|| format!("cannot open {}", self.db_path.display()))
    }

    /// Print `value` as JSON under `--json`, otherwise the human rendering.
    pub(crate) fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}

/// UTC stamp used in generated file names.
pub(crate) fn run_stamp() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string()
}
