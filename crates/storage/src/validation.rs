//! Post-migration structural checks.

use rusqlite::Connection;
use serde::Serialize;

use crate::catalog::{count, table_columns, table_exists, view_exists};
use crate::error::Result;
use crate::sql_value::{int_at, log_row_error, text_at};

const REQUIRED_TABLES: [&str; 9] = [
    "analysis_metrics",
    "analysis_results",
    "analysis_runs",
    "experiment_versions",
    "experiments",
    "projects",
    "spectra",
    "spectrum_data",
    "spectrum_sets",
];

const REQUIRED_VIEWS: [&str; 2] = ["legacy_analysis_runs_view", "legacy_spectrum_sets_view"];

const REQUIRED_COLUMNS: [(&str, &[&str]); 2] = [
    ("spectra", &["data_id", "quality_flag", "spectrum_set_id"]),
    ("analysis_results", &["analysis_run_id"]),
];

const SAMPLE_LIMIT: u32 = 3;

/// A row read back through a compatibility view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacySample {
    pub experiment_id: Option<i64>,
    pub kind: Option<String>,
    pub timestamp: Option<String>,
}

/// Errors mean the migrated schema is unusable; warnings deserve a look.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub spectrum_samples: Vec<LegacySample>,
    pub analysis_samples: Vec<LegacySample>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check that the migrated schema is complete and legacy rows are linked.
///
/// # Errors
/// Returns error if a catalog lookup fails.
pub fn validate(conn: &Connection) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    let mut missing_tables = Vec::new();
    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            missing_tables.push(table);
        }
    }
    if !missing_tables.is_empty() {
        report.errors.push(format!("missing tables: {}", missing_tables.join(", ")));
    }

    let mut missing_views = Vec::new();
    for view in REQUIRED_VIEWS {
        if !view_exists(conn, view)? {
            missing_views.push(view);
        }
    }
    if !missing_views.is_empty() {
        report.errors.push(format!("missing views: {}", missing_views.join(", ")));
    }

    for (table, required) in REQUIRED_COLUMNS {
        let present = table_columns(conn, table)?;
        let missing: Vec<&str> = required.iter().copied().filter(|c| !present.iter().any(|p| p == c)).collect();
        if !missing.is_empty() {
            report.errors.push(format!("{table} is missing columns: {}", missing.join(", ")));
        }
    }

    if view_exists(conn, "legacy_spectrum_sets_view")? && table_exists(conn, "spectra")? {
        let view_count = count(conn, "SELECT COUNT(*) FROM legacy_spectrum_sets_view", [])?;
        let spectra_count = count(conn, "SELECT COUNT(*) FROM spectra", [])?;
        if view_count != spectra_count {
            report.warnings.push(format!(
                "legacy_spectrum_sets_view has {view_count} rows but spectra has {spectra_count}; \
                 check for unmigrated or flagged rows"
            ));
        }
        report.spectrum_samples =
            sample(conn, "SELECT experiment_id, type, timestamp FROM legacy_spectrum_sets_view")?;
    } else {
        report.warnings.push("cannot count legacy_spectrum_sets_view rows (view or spectra missing)".to_owned());
    }

    if table_columns(conn, "analysis_results")?.iter().any(|c| c == "analysis_run_id") {
        let unlinked = count(conn, "SELECT COUNT(*) FROM analysis_results WHERE analysis_run_id IS NULL", [])?;
        if unlinked > 0 {
            report.errors.push(format!("{unlinked} analysis_results rows are not linked to analysis_runs"));
        }
    } else {
        report.warnings.push("cannot check analysis_results linkage (table or column missing)".to_owned());
    }

    if view_exists(conn, "legacy_analysis_runs_view")? {
        report.analysis_samples =
            sample(conn, "SELECT experiment_id, analysis_type, timestamp FROM legacy_analysis_runs_view")?;
    }

    tracing::info!(errors = report.errors.len(), warnings = report.warnings.len(), "Migration validated");
    Ok(report)
}

fn sample(conn: &Connection, select: &str) -> Result<Vec<LegacySample>> {
    let mut stmt = conn.prepare(&format!("{select} LIMIT {SAMPLE_LIMIT}"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LegacySample { experiment_id: int_at(row, 0)?, kind: text_at(row, 1)?, timestamp: text_at(row, 2)? })
        })?
        .filter_map(log_row_error)
        .collect();
    Ok(rows)
}
