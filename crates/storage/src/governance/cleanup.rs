//! Reference-safe soft-delete of stale snapshot rows.

use chrono::{Duration, NaiveDateTime, Utc};
use nanosense_core::timestamp::{format_timestamp, parse_timestamp};
use rusqlite::Connection;
use serde::Serialize;

use super::SnapshotTable;
use super::analyze::load_snapshot_rows;
use super::references::reference_counts;
use crate::catalog::{column_exists, table_exists};
use crate::error::{Result, StorageError};
use crate::sql_value::coerce_to_sql;

/// Upper age bound for cleanup candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    /// Rows stamped at or before this instant (naive UTC).
    At(NaiveDateTime),
    /// Rows older than this many days.
    AgeDays(i64),
}

impl Cutoff {
    /// Concrete cutoff instant relative to `now`.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidInput`] when the age reaches outside
    /// the representable date range.
    pub fn resolve(&self, now: NaiveDateTime) -> Result<NaiveDateTime> {
        match self {
            Self::At(at) => Ok(*at),
            Self::AgeDays(days) => Duration::try_days(*days)
                .and_then(|age| now.checked_sub_signed(age))
                .ok_or_else(|| StorageError::InvalidInput(format!("cleanup age of {days} days is out of range"))),
        }
    }
}

/// What to clean and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub cutoff: Cutoff,
    /// Optional lower bound; rows stamped before it are left alone.
    pub window_start: Option<NaiveDateTime>,
    /// Tables to process, in order. Empty means both.
    pub tables: Vec<SnapshotTable>,
    pub dry_run: bool,
}

impl CleanupPolicy {
    #[must_use]
    pub fn new(cutoff: Cutoff) -> Self {
        Self { cutoff, window_start: None, tables: Vec::new(), dry_run: false }
    }

    fn selected_tables(&self) -> Vec<SnapshotTable> {
        if self.tables.is_empty() {
            return SnapshotTable::ALL_VARIANTS.to_vec();
        }
        let mut seen = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            if !seen.contains(table) {
                seen.push(*table);
            }
        }
        seen
    }
}

/// An active, unreferenced row inside the cleanup window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupCandidate {
    pub record_id: i64,
    pub timestamp: Option<String>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Processed,
    TableMissing,
    /// The soft-delete column has not been added yet.
    NoSoftDelete,
}

/// Outcome for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCleanup {
    pub table: SnapshotTable,
    pub status: CleanupStatus,
    pub candidates: Vec<CleanupCandidate>,
    pub updated_count: usize,
}

impl TableCleanup {
    fn skipped(table: SnapshotTable, status: CleanupStatus) -> Self {
        Self { table, status, candidates: Vec::new(), updated_count: 0 }
    }
}

/// Outcome of one cleanup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub cutoff: String,
    pub window_start: Option<String>,
    pub dry_run: bool,
    pub tables: Vec<TableCleanup>,
}

/// Deactivate active snapshot rows that nothing references and whose
/// timestamp lies inside `[window_start, cutoff]`.
///
/// Rows with a missing or unparsable timestamp are never candidates. With
/// `dry_run` nothing is written. Otherwise each table's candidates flip in
/// one `UPDATE` statement.
///
/// # Errors
/// Returns [`StorageError::InvalidInput`] when `window_start` is later than
/// the cutoff, or a database error.
pub fn cleanup(conn: &Connection, policy: &CleanupPolicy) -> Result<CleanupReport> {
    let cutoff = policy.cutoff.resolve(Utc::now().naive_utc())?;
    if let Some(start) = policy.window_start {
        if start > cutoff {
            return Err(StorageError::InvalidInput(format!(
                "window start {} is later than the cutoff {}",
                format_timestamp(&start),
                format_timestamp(&cutoff)
            )));
        }
    }

    let mut tables = Vec::new();
    for table in policy.selected_tables() {
        let outcome = cleanup_table(conn, table, policy.window_start, cutoff, policy.dry_run)?;
        tracing::info!(
            table = %table,
            candidates = outcome.candidates.len(),
            updated = outcome.updated_count,
            dry_run = policy.dry_run,
            "Snapshot cleanup"
        );
        tables.push(outcome);
    }
    Ok(CleanupReport {
        cutoff: format_timestamp(&cutoff),
        window_start: policy.window_start.as_ref().map(format_timestamp),
        dry_run: policy.dry_run,
        tables,
    })
}

fn cleanup_table(
    conn: &Connection,
    table: SnapshotTable,
    window_start: Option<NaiveDateTime>,
    cutoff: NaiveDateTime,
    dry_run: bool,
) -> Result<TableCleanup> {
    if !table_exists(conn, table.as_str())? {
        return Ok(TableCleanup::skipped(table, CleanupStatus::TableMissing));
    }
    if !column_exists(conn, table.as_str(), "is_active")? {
        tracing::warn!(table = %table, "Snapshot table has no is_active column; skipping cleanup");
        return Ok(TableCleanup::skipped(table, CleanupStatus::NoSoftDelete));
    }

    let references = reference_counts(conn, table)?;
    let candidates: Vec<CleanupCandidate> = load_snapshot_rows(conn, table, true)?
        .into_iter()
        .filter(|row| references.get(&row.id).copied().unwrap_or(0) == 0)
        .filter(|row| {
            let Some(stamp) = row.timestamp.as_deref().and_then(parse_timestamp) else {
                return false;
            };
            window_start.is_none_or(|start| stamp >= start) && stamp <= cutoff
        })
        .map(|row| CleanupCandidate { record_id: row.id, timestamp: row.timestamp, fingerprint: row.fingerprint })
        .collect();

    let updated_count = if dry_run || candidates.is_empty() {
        0
    } else {
        let placeholders = candidates.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE {} SET is_active = 0 WHERE {} IN ({placeholders})",
            table.as_str(),
            table.id_column()
        );
        let ids: Vec<i64> = candidates.iter().map(|c| c.record_id).collect();
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(coerce_to_sql).collect();
        conn.execute(&sql, params.as_slice())?
    };

    Ok(TableCleanup { table, status: CleanupStatus::Processed, candidates, updated_count })
}

/// One line per candidate, or `(none)`.
#[must_use]
pub fn format_candidates(candidates: &[CleanupCandidate]) -> String {
    if candidates.is_empty() {
        return "(none)".to_owned();
    }
    candidates
        .iter()
        .map(|c| {
            let mut line = format!("- ID {}", c.record_id);
            if let Some(ts) = c.timestamp.as_deref().filter(|ts| !ts.is_empty()) {
                line.push_str(&format!(", timestamp={ts}"));
            }
            line.push_str(&format!(", fingerprint={}", c.fingerprint));
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
