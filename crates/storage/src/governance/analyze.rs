//! Duplicate and reference analysis of snapshot tables.

use std::collections::BTreeMap;

use nanosense_core::snapshot::{canonicalize, canonicalize_instrument, canonicalize_processing, fingerprint};
use nanosense_core::{Canonical, CanonicalMap, ConfigValue};
use rusqlite::Connection;
use serde::Serialize;

use super::SnapshotTable;
use super::references::reference_counts;
use crate::catalog::{column_exists, table_exists};
use crate::error::Result;
use crate::sql_value::{log_row_error, text_at, value_at};

/// One snapshot row reduced to what governance needs.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct SnapshotRow {
    pub id: i64,
    pub timestamp: Option<String>,
    pub fingerprint: String,
    pub representative: CanonicalMap,
}

/// Rows sharing one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateBucket {
    pub fingerprint: String,
    pub count: usize,
    pub record_ids: Vec<i64>,
    pub reference_count: u64,
    pub representative: CanonicalMap,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

impl DuplicateBucket {
    fn new(row: &SnapshotRow) -> Self {
        Self {
            fingerprint: row.fingerprint.clone(),
            count: 0,
            record_ids: Vec::new(),
            reference_count: 0,
            representative: row.representative.clone(),
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    fn absorb(&mut self, row: &SnapshotRow, references: u64) {
        self.count += 1;
        self.record_ids.push(row.id);
        self.reference_count += references;
        if let Some(ts) = row.timestamp.as_deref().filter(|ts| !ts.is_empty()) {
            if self.first_timestamp.as_deref().is_none_or(|first| ts < first) {
                self.first_timestamp = Some(ts.to_owned());
            }
            if self.last_timestamp.as_deref().is_none_or(|last| ts > last) {
                self.last_timestamp = Some(ts.to_owned());
            }
        }
    }

    /// `first -> last`, when both ends are known.
    #[must_use]
    pub fn time_range(&self) -> Option<String> {
        match (&self.first_timestamp, &self.last_timestamp) {
            (Some(first), Some(last)) => Some(format!("{first} -> {last}")),
            _ => None,
        }
    }
}

/// Statistics for one snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableAnalysis {
    pub table: SnapshotTable,
    pub total_records: usize,
    pub unique_fingerprints: usize,
    pub duplicate_records: usize,
    pub duplicate_ratio: f64,
    pub referenced_records: usize,
    pub unreferenced_records: usize,
    /// Lexicographic min/max of the row timestamps.
    pub date_range: Option<(String, String)>,
    /// Buckets with more than one row, largest first, at most `top_n`.
    pub top_duplicates: Vec<DuplicateBucket>,
}

impl TableAnalysis {
    #[must_use]
    pub fn date_range_label(&self) -> Option<String> {
        self.date_range.as_ref().map(|(first, last)| format!("{first} -> {last}"))
    }
}

/// Analysis of both snapshot tables; `None` marks a missing table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotAnalysis {
    pub instrument_states: Option<TableAnalysis>,
    pub processing_snapshots: Option<TableAnalysis>,
}

impl SnapshotAnalysis {
    /// Tables in report order.
    #[must_use]
    pub fn tables(&self) -> [(SnapshotTable, Option<&TableAnalysis>); 2] {
        [
            (SnapshotTable::InstrumentStates, self.instrument_states.as_ref()),
            (SnapshotTable::ProcessingSnapshots, self.processing_snapshots.as_ref()),
        ]
    }
}

/// Analyze both snapshot tables.
///
/// # Errors
/// Returns error if database query fails.
pub fn analyze(conn: &Connection, top_n: usize) -> Result<SnapshotAnalysis> {
    Ok(SnapshotAnalysis {
        instrument_states: analyze_table(conn, SnapshotTable::InstrumentStates, top_n)?,
        processing_snapshots: analyze_table(conn, SnapshotTable::ProcessingSnapshots, top_n)?,
    })
}

/// Analyze one snapshot table; `None` when it does not exist.
///
/// # Errors
/// Returns error if database query fails.
#[allow(clippy::cast_precision_loss, reason = "row counts fit f64 mantissa")]
pub fn analyze_table(conn: &Connection, table: SnapshotTable, top_n: usize) -> Result<Option<TableAnalysis>> {
    if !table_exists(conn, table.as_str())? {
        return Ok(None);
    }
    let rows = load_snapshot_rows(conn, table, false)?;
    let references = reference_counts(conn, table)?;

    let mut buckets: BTreeMap<String, DuplicateBucket> = BTreeMap::new();
    let mut referenced_records = 0_usize;
    let mut first: Option<&str> = None;
    let mut last: Option<&str> = None;
    for row in &rows {
        let refs = references.get(&row.id).copied().unwrap_or(0);
        buckets.entry(row.fingerprint.clone()).or_insert_with(|| DuplicateBucket::new(row)).absorb(row, refs);
        if refs > 0 {
            referenced_records += 1;
        }
        if let Some(ts) = row.timestamp.as_deref().filter(|ts| !ts.is_empty()) {
            first = Some(first.map_or(ts, |f| f.min(ts)));
            last = Some(last.map_or(ts, |l| l.max(ts)));
        }
    }

    let total_records = rows.len();
    let unique_fingerprints = buckets.len();
    let duplicate_records = total_records - unique_fingerprints;
    let duplicate_ratio =
        if total_records == 0 { 0.0 } else { duplicate_records as f64 / total_records as f64 };

    // BTreeMap yields fingerprint order; the stable sort keeps it among equal counts
    let mut top_duplicates: Vec<DuplicateBucket> = buckets.into_values().filter(|b| b.count > 1).collect();
    top_duplicates.sort_by(|a, b| b.count.cmp(&a.count));
    top_duplicates.truncate(top_n);

    let analysis = TableAnalysis {
        table,
        total_records,
        unique_fingerprints,
        duplicate_records,
        duplicate_ratio,
        referenced_records,
        unreferenced_records: total_records - referenced_records,
        date_range: first.zip(last).map(|(f, l)| (f.to_owned(), l.to_owned())),
        top_duplicates,
    };
    tracing::debug!(
        table = %table,
        total = analysis.total_records,
        unique = analysis.unique_fingerprints,
        unreferenced = analysis.unreferenced_records,
        "Snapshot table analyzed"
    );
    Ok(Some(analysis))
}

/// Load every row (or only active rows) with its fingerprint, in id order.
pub(super) fn load_snapshot_rows(
    conn: &Connection,
    table: SnapshotTable,
    active_only: bool,
) -> Result<Vec<SnapshotRow>> {
    let filter = if active_only { " WHERE is_active = 1" } else { "" };
    let rows = match table {
        SnapshotTable::InstrumentStates => {
            let mut stmt = conn.prepare(&format!(
                "SELECT instrument_state_id, device_serial, integration_time_ms, averaging, temperature,
                        config_json, captured_at
                 FROM instrument_states{filter}
                 ORDER BY instrument_state_id"
            ))?;
            let collected: Vec<SnapshotRow> = stmt.query_map([], |row| {
                let config = ConfigValue::parse_lenient(text_at(row, 5)?.as_deref());
                let canonical = canonicalize_instrument(
                    &value_at(row, 1)?,
                    &value_at(row, 2)?,
                    &value_at(row, 3)?,
                    &value_at(row, 4)?,
                    &config,
                );
                Ok(SnapshotRow {
                    id: row.get(0)?,
                    timestamp: text_at(row, 6)?,
                    fingerprint: fingerprint(&canonical),
                    representative: canonical,
                })
            })?
            .filter_map(log_row_error)
            .collect();
            collected
        },
        SnapshotTable::ProcessingSnapshots => {
            let created_by = if column_exists(conn, "processing_snapshots", "created_by")? { "created_by" } else { "NULL" };
            let mut stmt = conn.prepare(&format!(
                "SELECT processing_config_id, name, version, parameters_json, {created_by}, created_at
                 FROM processing_snapshots{filter}
                 ORDER BY processing_config_id"
            ))?;
            let collected: Vec<SnapshotRow> = stmt.query_map([], |row| {
                let name = value_at(row, 1)?;
                let version = value_at(row, 2)?;
                let parameters = ConfigValue::parse_lenient(text_at(row, 3)?.as_deref());
                let canonical = canonicalize_processing(&processing_payload(&name, &version, parameters));
                let mut representative =
                    canonicalize(&ConfigValue::map([("name", name), ("version", version), ("created_by", value_at(row, 4)?)]));
                if let Some(params) = canonical.get("parameters") {
                    representative.insert("parameters".to_owned(), params.clone());
                }
                Ok(SnapshotRow {
                    id: row.get(0)?,
                    timestamp: text_at(row, 5)?,
                    fingerprint: fingerprint(&canonical),
                    representative,
                })
            })?
            .filter_map(log_row_error)
            .collect();
            collected
        },
    };
    Ok(rows)
}

/// Flat processing payload: name and version, then the stored parameters.
///
/// A non-map parameter payload is kept under `payload`.
fn processing_payload(name: &ConfigValue, version: &ConfigValue, parameters: ConfigValue) -> ConfigValue {
    let mut entries = vec![("name".to_owned(), name.clone()), ("version".to_owned(), version.clone())];
    match parameters {
        ConfigValue::Map(params) => entries.extend(params),
        ConfigValue::Null => {},
        other => entries.push(("payload".to_owned(), other)),
    }
    ConfigValue::Map(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_map_parameters_fold_under_payload() {
        let payload = processing_payload(&"smooth".into(), &"2".into(), ConfigValue::Int(5));
        let canonical = canonicalize_processing(&payload);
        let expected = CanonicalMap::from([("payload".to_owned(), Canonical::Int(5))]);
        assert_eq!(canonical.get("parameters"), Some(&Canonical::Map(expected)));
    }

    #[test]
    fn parameter_name_overrides_stored_name() {
        let params = ConfigValue::map([("name", ConfigValue::from("other")), ("window", ConfigValue::Int(3))]);
        let canonical = canonicalize_processing(&processing_payload(&"smooth".into(), &"2".into(), params));
        assert_eq!(canonical.get("name"), Some(&Canonical::Text("other".into())));
    }
}
