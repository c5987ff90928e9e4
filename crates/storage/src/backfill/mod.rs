//! Legacy-to-normalized data phase.
//!
//! Walks legacy `spectra` and `analysis_results` rows that lack forward
//! pointers and creates the matching normalized records. Each row is decided
//! on its own: data defects become quality flags and skip counts, while SQL
//! failures abort the enclosing transaction.

mod analysis;
mod defaults;
mod spectra;

use rusqlite::{Connection, OptionalExtension as _, params};
use serde::Serialize;

use crate::catalog::{column_exists, table_exists};
use crate::error::Result;

pub use analysis::metric_unit;
pub use defaults::{
    DEFAULT_INSTRUMENT_SERIAL, DEFAULT_PROCESSING_NAME, DEFAULT_PROCESSING_VERSION,
    ensure_default_instrument_state, ensure_default_processing_snapshot,
};
pub use spectra::parse_numeric_array;

/// Migrated/skipped counts for one legacy table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowTally {
    pub migrated: u64,
    pub skipped: u64,
}

/// Outcome of one data-phase pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub spectra: RowTally,
    pub analysis_results: RowTally,
}

/// Run the data phase over both legacy tables.
///
/// Tables or columns that do not exist yet are treated as having no rows.
///
/// # Errors
/// Returns error on any SQL failure.
pub fn run(conn: &Connection) -> Result<BackfillReport> {
    let spectra = if spectra_ready(conn)? { spectra::migrate(conn)? } else { RowTally::default() };
    let analysis_results =
        if analysis_ready(conn)? { analysis::migrate(conn)? } else { RowTally::default() };
    Ok(BackfillReport { spectra, analysis_results })
}

fn spectra_ready(conn: &Connection) -> Result<bool> {
    Ok(table_exists(conn, "spectra")?
        && column_exists(conn, "spectra", "data_id")?
        && column_exists(conn, "spectra", "spectrum_set_id")?
        && table_exists(conn, "spectrum_data")?
        && table_exists(conn, "spectrum_sets")?
        && table_exists(conn, "instrument_states")?
        && table_exists(conn, "processing_snapshots")?)
}

fn analysis_ready(conn: &Connection) -> Result<bool> {
    Ok(table_exists(conn, "analysis_results")?
        && column_exists(conn, "analysis_results", "analysis_run_id")?
        && table_exists(conn, "analysis_runs")?
        && table_exists(conn, "analysis_metrics")?)
}

pub(crate) fn experiment_exists(conn: &Connection, experiment_id: Option<i64>) -> Result<bool> {
    let Some(id) = experiment_id else {
        return Ok(false);
    };
    let found = conn
        .query_row(
            "SELECT 1 FROM experiments WHERE experiment_id = ?1 LIMIT 1",
            params![id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// First non-blank value.
fn first_non_blank<'a>(values: &[Option<&'a str>]) -> Option<&'a str> {
    values.iter().flatten().copied().find(|v| !v.trim().is_empty())
}
