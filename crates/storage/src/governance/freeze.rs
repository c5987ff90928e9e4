//! Legacy table freeze audit.
//!
//! Verifies that `spectra` and `analysis_results` stopped receiving writes
//! after a threshold, optionally backfills the rows still lacking forward
//! pointers, and records before/after numbers in a Markdown report.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};
use nanosense_core::timestamp::format_timestamp;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde::Serialize;

use super::analyze::{SnapshotAnalysis, TableAnalysis, analyze};
use crate::backfill::{self, BackfillReport};
use crate::catalog::{count, table_columns, table_exists};
use crate::error::Result;

/// Audited legacy tables with the columns that mark a row as migrated.
struct LegacyTable {
    name: &'static str,
    pointer_columns: &'static [&'static str],
    pending_predicate: &'static str,
    pending_warning: &'static str,
    recent_warning: &'static str,
}

const LEGACY_TABLES: [LegacyTable; 2] = [
    LegacyTable {
        name: "spectra",
        pointer_columns: &["spectrum_set_id", "data_id"],
        pending_predicate: "spectrum_set_id IS NULL OR data_id IS NULL",
        pending_warning: "rows are still missing structured pointers",
        recent_warning: "rows created after freeze threshold",
    },
    LegacyTable {
        name: "analysis_results",
        pointer_columns: &["analysis_run_id"],
        pending_predicate: "analysis_run_id IS NULL",
        pending_warning: "rows still lack analysis_run_id",
        recent_warning: "rows were written after freeze threshold",
    },
];

/// Write-recency columns, first present one wins.
const RECENT_COLUMNS: [&str; 2] = ["created_at", "timestamp"];

/// Counters for one legacy table. `None` means "could not be measured".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyTableStats {
    pub table: String,
    pub exists: bool,
    pub total: Option<u64>,
    /// Rows lacking a forward pointer.
    pub pending: Option<u64>,
    /// Rows stamped after the freeze threshold.
    pub recent: Option<u64>,
}

/// Inputs of [`run_freeze_audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeAuditOptions {
    /// Store file, copied when `backup_dir` is set.
    pub db_path: PathBuf,
    pub freeze_after: Option<NaiveDateTime>,
    pub backup_dir: Option<PathBuf>,
    pub export_csv_dir: Option<PathBuf>,
    pub backfill_missing: bool,
    /// Where the Markdown report goes; not written when `None`.
    pub report_file: Option<PathBuf>,
    /// Duplicate buckets kept per table in the snapshot analyses.
    pub top_n: usize,
}

/// Rows repaired by the audit's backfill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreezeBackfill {
    pub spectra_fixed: u64,
    pub analysis_fixed: u64,
    pub report: BackfillReport,
}

/// Outcome of one freeze audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreezeAuditReport {
    pub generated_at: String,
    pub freeze_after: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub csv_exports: Vec<PathBuf>,
    pub before: Vec<LegacyTableStats>,
    pub after: Vec<LegacyTableStats>,
    pub snapshots_before: SnapshotAnalysis,
    pub snapshots_after: SnapshotAnalysis,
    pub backfill: Option<FreezeBackfill>,
    pub warnings: Vec<String>,
    pub report_path: Option<PathBuf>,
}

impl FreezeAuditReport {
    /// Strict callers treat any warning as failure.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Measure both legacy tables. `freeze_after` is compared as text against
/// the first recency column present, so it must be in store format.
///
/// # Errors
/// Returns error if database query fails.
pub fn audit_legacy_tables(conn: &Connection, freeze_after: Option<&str>) -> Result<Vec<LegacyTableStats>> {
    LEGACY_TABLES.iter().map(|spec| audit_table(conn, spec, freeze_after)).collect()
}

fn audit_table(conn: &Connection, spec: &LegacyTable, freeze_after: Option<&str>) -> Result<LegacyTableStats> {
    let mut stats =
        LegacyTableStats { table: spec.name.to_owned(), exists: false, total: None, pending: None, recent: None };
    if !table_exists(conn, spec.name)? {
        return Ok(stats);
    }
    stats.exists = true;
    stats.total = Some(count(conn, &format!("SELECT COUNT(*) FROM {}", spec.name), [])?);

    let columns = table_columns(conn, spec.name)?;
    let has = |column: &str| columns.iter().any(|c| c == column);
    if spec.pointer_columns.iter().all(|c| has(c)) {
        stats.pending = Some(count(
            conn,
            &format!("SELECT COUNT(*) FROM {} WHERE {}", spec.name, spec.pending_predicate),
            [],
        )?);
    }
    if let Some(threshold) = freeze_after {
        if let Some(column) = RECENT_COLUMNS.into_iter().find(|c| has(c)) {
            stats.recent = Some(count(
                conn,
                &format!("SELECT COUNT(*) FROM {} WHERE {column} IS NOT NULL AND {column} > ?1", spec.name),
                [threshold],
            )?);
        }
    }
    Ok(stats)
}

/// Advisory findings: pending rows, post-threshold writes, missing tables.
#[must_use]
pub fn freeze_warnings(stats: &[LegacyTableStats], freeze_after: Option<&str>) -> Vec<String> {
    let mut warnings = Vec::new();
    for spec in &LEGACY_TABLES {
        let Some(table) = stats.iter().find(|s| s.table == spec.name) else {
            continue;
        };
        if !table.exists {
            warnings.push(format!("{} table missing; cannot verify freeze status.", spec.name));
            continue;
        }
        if let Some(pending) = table.pending.filter(|n| *n > 0) {
            warnings.push(format!("{pending} {} {}.", spec.name, spec.pending_warning));
        }
        if let (Some(threshold), Some(recent)) = (freeze_after, table.recent.filter(|n| *n > 0)) {
            warnings.push(format!("{recent} {} {} {threshold}.", spec.name, spec.recent_warning));
        }
    }
    warnings
}

/// Copy the store file to `<backup_dir>/<stem>_<stamp><ext>`.
///
/// # Errors
/// Returns error if the directory cannot be created or the copy fails.
pub fn backup_database(db_path: &Path, backup_dir: &Path, run_stamp: &str) -> Result<PathBuf> {
    fs::create_dir_all(backup_dir)?;
    let stem = db_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = db_path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let target = backup_dir.join(format!("{stem}_{run_stamp}{ext}"));
    fs::copy(db_path, &target)?;
    tracing::info!(path = %target.display(), "Database backup created");
    Ok(target)
}

/// Dump every row of `table` to a CSV file with a header row.
///
/// # Errors
/// Returns error if the query or the file write fails.
pub fn export_legacy_csv(conn: &Connection, table: &str, destination: &Path) -> Result<PathBuf> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table}"))?;
    let headers: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
    let width = headers.len();

    let mut writer = csv::Writer::from_path(destination)?;
    writer.write_record(&headers)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(width);
        for idx in 0..width {
            record.push(match row.get_ref(idx)? {
                ValueRef::Null => String::new(),
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => f.to_string(),
                ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
            });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    tracing::info!(table, path = %destination.display(), "Legacy table exported");
    Ok(destination.to_path_buf())
}

/// Backup, export, measure, optionally backfill, measure again, and report.
///
/// The backfill runs in its own transaction. Warnings are computed from the
/// final state and never turn into errors here.
///
/// # Errors
/// Returns error on I/O or database failure.
pub fn run_freeze_audit(conn: &Connection, options: &FreezeAuditOptions) -> Result<FreezeAuditReport> {
    let now = Utc::now();
    let run_stamp = now.format("%Y%m%d-%H%M%S").to_string();
    let freeze_after = options.freeze_after.as_ref().map(format_timestamp);

    let backup_path = match &options.backup_dir {
        Some(dir) => Some(backup_database(&options.db_path, dir, &run_stamp)?),
        None => None,
    };

    let mut csv_exports = Vec::new();
    if let Some(dir) = &options.export_csv_dir {
        for spec in &LEGACY_TABLES {
            if table_exists(conn, spec.name)? {
                let destination = dir.join(format!("{}_{run_stamp}.csv", spec.name));
                csv_exports.push(export_legacy_csv(conn, spec.name, &destination)?);
            }
        }
    }

    let top_n = options.top_n;
    let before = audit_legacy_tables(conn, freeze_after.as_deref())?;
    let snapshots_before = analyze(conn, top_n)?;

    let (after, snapshots_after, backfill) = if options.backfill_missing {
        let tx = conn.unchecked_transaction()?;
        let report = backfill::run(&tx)?;
        tx.commit()?;
        let after = audit_legacy_tables(conn, freeze_after.as_deref())?;
        let summary = FreezeBackfill {
            spectra_fixed: fixed(&before, &after, "spectra"),
            analysis_fixed: fixed(&before, &after, "analysis_results"),
            report,
        };
        tracing::info!(
            spectra_fixed = summary.spectra_fixed,
            analysis_fixed = summary.analysis_fixed,
            "Freeze audit backfill finished"
        );
        (after, analyze(conn, top_n)?, Some(summary))
    } else {
        (before.clone(), snapshots_before.clone(), None)
    };

    let warnings = freeze_warnings(&after, freeze_after.as_deref());
    for warning in &warnings {
        tracing::warn!(warning = %warning, "Freeze audit warning");
    }

    let mut report = FreezeAuditReport {
        generated_at: format!("{} UTC", format_timestamp(&now.naive_utc())),
        freeze_after,
        backup_path,
        csv_exports,
        before,
        after,
        snapshots_before,
        snapshots_after,
        backfill,
        warnings,
        report_path: None,
    };
    if let Some(path) = &options.report_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, render_freeze_report(&report))?;
        tracing::info!(path = %path.display(), "Freeze report written");
        report.report_path = Some(path.clone());
    }
    Ok(report)
}

fn fixed(before: &[LegacyTableStats], after: &[LegacyTableStats], table: &str) -> u64 {
    let pending = |stats: &[LegacyTableStats]| {
        stats.iter().find(|s| s.table == table).and_then(|s| s.pending).unwrap_or(0)
    };
    pending(before).saturating_sub(pending(after))
}

fn legacy_cell(stats: &[LegacyTableStats], table: &str, metric: &str) -> String {
    stats
        .iter()
        .find(|s| s.table == table)
        .and_then(|s| match metric {
            "total" => s.total,
            "pending" => s.pending,
            _ => s.recent,
        })
        .map_or_else(|| "-".to_owned(), |n| n.to_string())
}

fn snapshot_cell(stats: Option<&TableAnalysis>, metric: &str) -> String {
    stats.map_or_else(
        || "-".to_owned(),
        |a| match metric {
            "duplicates" => a.duplicate_records.to_string(),
            _ => a.unreferenced_records.to_string(),
        },
    )
}

/// Markdown rendering of a [`FreezeAuditReport`].
#[must_use]
pub fn render_freeze_report(report: &FreezeAuditReport) -> String {
    let mut lines = vec![
        format!("# Legacy Freeze Audit ({})", report.generated_at),
        String::new(),
        format!("- Freeze threshold: `{}`", report.freeze_after.as_deref().unwrap_or("n/a")),
        match &report.backup_path {
            Some(path) => format!("- Backup: `{}`", path.display()),
            None => "- Backup: skipped".to_owned(),
        },
    ];
    if report.csv_exports.is_empty() {
        lines.push("- CSV exports: skipped".to_owned());
    } else {
        lines.push("- CSV exports:".to_owned());
        lines.extend(report.csv_exports.iter().map(|p| format!("  - {}", p.display())));
    }

    lines.push(String::new());
    lines.push("## Metrics".to_owned());
    lines.push("| Metric | Before | After |".to_owned());
    lines.push("| --- | --- | --- |".to_owned());
    for (table, label) in [("spectra", "Spectra"), ("analysis_results", "Analysis")] {
        for metric in ["total", "pending", "recent"] {
            lines.push(format!(
                "| {label} {metric} | {} | {} |",
                legacy_cell(&report.before, table, metric),
                legacy_cell(&report.after, table, metric)
            ));
        }
    }

    lines.push(String::new());
    lines.push("## Snapshot Duplicates".to_owned());
    lines.push("| Table | Metric | Before | After |".to_owned());
    lines.push("| --- | --- | --- | --- |".to_owned());
    for ((table, before), (_, after)) in report.snapshots_before.tables().into_iter().zip(report.snapshots_after.tables())
    {
        for metric in ["duplicates", "unreferenced"] {
            lines.push(format!(
                "| {table} | {metric} | {} | {} |",
                snapshot_cell(before, metric),
                snapshot_cell(after, metric)
            ));
        }
    }

    lines.push(String::new());
    lines.push("## Warnings".to_owned());
    if report.warnings.is_empty() {
        lines.push("- None".to_owned());
    } else {
        lines.extend(report.warnings.iter().map(|w| format!("- {w}")));
    }

    lines.push(String::new());
    lines.push("## Backfill".to_owned());
    match &report.backfill {
        Some(summary) => lines.push(format!(
            "- spectra rows fixed: {}, analysis rows fixed: {}",
            summary.spectra_fixed, summary.analysis_fixed
        )),
        None => lines.push("- Not requested.".to_owned()),
    }
    lines.join("\n")
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test code")]
mod tests {
    use super::*;

    fn legacy_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE spectra (
                spectrum_id INTEGER PRIMARY KEY, experiment_id INTEGER, timestamp TEXT,
                created_at TEXT, spectrum_set_id INTEGER, data_id INTEGER
             );
             CREATE TABLE analysis_results (
                result_id INTEGER PRIMARY KEY, experiment_id INTEGER, timestamp TEXT, analysis_run_id INTEGER
             );
             INSERT INTO spectra VALUES
                (1, 1, '2025-01-01 00:00:00', '2025-01-01 00:10:00', NULL, NULL),
                (2, 1, '2025-01-02 00:00:00', '2025-01-02 00:10:00', 10, 20);
             INSERT INTO analysis_results VALUES
                (5, 1, '2025-01-01 00:00:00', NULL),
                (6, 1, '2024-12-01 00:00:00', 7);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn counts_pending_and_recent_rows() {
        let conn = legacy_conn();
        let stats = audit_legacy_tables(&conn, Some("2024-12-31 23:59:59")).unwrap();
        assert_eq!(stats[0].table, "spectra");
        assert_eq!(stats[0].total, Some(2));
        assert_eq!(stats[0].pending, Some(1));
        assert_eq!(stats[0].recent, Some(2));
        assert_eq!(stats[1].pending, Some(1));
        assert_eq!(stats[1].recent, Some(1));
    }

    #[test]
    fn recent_is_unmeasured_without_threshold() {
        let conn = legacy_conn();
        let stats = audit_legacy_tables(&conn, None).unwrap();
        assert!(stats.iter().all(|s| s.recent.is_none()));
    }

    #[test]
    fn warnings_cover_pending_recent_and_missing() {
        let stats = vec![
            LegacyTableStats { table: "spectra".into(), exists: true, total: Some(3), pending: Some(2), recent: Some(1) },
            LegacyTableStats { table: "analysis_results".into(), exists: false, total: None, pending: None, recent: None },
        ];
        let warnings = freeze_warnings(&stats, Some("2025-01-01 00:00:00"));
        assert_eq!(
            warnings,
            vec![
                "2 spectra rows are still missing structured pointers.".to_owned(),
                "1 spectra rows created after freeze threshold 2025-01-01 00:00:00.".to_owned(),
                "analysis_results table missing; cannot verify freeze status.".to_owned(),
            ]
        );
    }

    #[test]
    fn backup_keeps_stem_and_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("store.db");
        fs::write(&db, b"sqlite").unwrap();
        let target = backup_database(&db, &dir.path().join("backups"), "20250101-000000").unwrap();
        assert_eq!(target.file_name().unwrap(), "store_20250101-000000.db");
        assert_eq!(fs::read(target).unwrap(), b"sqlite");
    }
}
