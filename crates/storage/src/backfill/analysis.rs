//! Legacy `analysis_results` rows to `analysis_runs` + `analysis_metrics`.

use nanosense_core::constants::MAX_RUN_INSERT_ATTEMPTS;
use nanosense_core::snapshot::serialize_value;
use nanosense_core::timestamp::timestamp_or_now;
use nanosense_core::{ConfigValue, QualityFlag};
use rusqlite::{Connection, params};

use super::{RowTally, experiment_exists};
use crate::catalog::{column_exists, unique_key_includes};
use crate::error::{Result, is_constraint_violation};
use crate::sql_value::{int_at, text_at};

const UNKNOWN_ANALYSIS_TYPE: &str = "Unknown";
const LEGACY_ALGORITHM_VERSION: &str = "legacy";

struct LegacyResult {
    result_id: i64,
    experiment_id: Option<i64>,
    analysis_type: Option<String>,
    timestamp: Option<String>,
    result_data: Option<String>,
    source_spectrum_ids: Option<String>,
}

/// One extracted metric row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Metric {
    key: String,
    value: String,
    unit: Option<&'static str>,
    is_primary: bool,
}

/// Unit for a metric key under a given analysis type.
#[must_use]
pub fn metric_unit(analysis_type: &str, key: &str) -> Option<&'static str> {
    match (analysis_type, key) {
        ("Affinity_KD", "KD") => Some("nM"),
        _ => None,
    }
}

fn extract_metrics(analysis_type: &str, payload: &ConfigValue) -> Vec<Metric> {
    let mut metrics = Vec::new();
    let mut primary_taken = false;
    let mut push = |key: String, value: &ConfigValue, metrics: &mut Vec<Metric>| {
        let Some((text, numeric)) = value.metric_text() else {
            return;
        };
        let is_primary = numeric && !primary_taken;
        primary_taken |= is_primary;
        let unit = metric_unit(analysis_type, &key);
        metrics.push(Metric { key, value: text, unit, is_primary });
    };
    match payload {
        ConfigValue::Map(entries) => {
            for (key, value) in entries {
                push(key.clone(), value, &mut metrics);
            }
        },
        ConfigValue::List(items) => {
            for (idx, value) in items.iter().enumerate() {
                push(format!("item_{idx}"), value, &mut metrics);
            }
        },
        other => push("raw_payload".to_owned(), other, &mut metrics),
    }
    metrics
}

fn input_context(row: &LegacyResult) -> String {
    let mut entries = vec![("legacy_result_id".to_owned(), ConfigValue::Int(row.result_id))];
    let sources = ConfigValue::parse_lenient(row.source_spectrum_ids.as_deref());
    if !sources.is_null() {
        entries.push(("source_spectrum_ids".to_owned(), sources));
    }
    if let Some(raw) = row.result_data.as_deref().filter(|s| !s.is_empty()) {
        entries.push(("raw_result_data".to_owned(), ConfigValue::from(raw)));
    }
    serialize_value(&ConfigValue::Map(entries))
}

fn load_pending(conn: &Connection) -> Result<Vec<LegacyResult>> {
    let sources_expr =
        if column_exists(conn, "analysis_results", "source_spectrum_ids")? { "source_spectrum_ids" } else { "NULL" };
    let sql = format!(
        "SELECT result_id, experiment_id, analysis_type, timestamp, result_data, {sources_expr}
         FROM analysis_results
         WHERE analysis_run_id IS NULL
         ORDER BY result_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LegacyResult {
                result_id: row.get(0)?,
                experiment_id: int_at(row, 1)?,
                analysis_type: text_at(row, 2)?,
                timestamp: text_at(row, 3)?,
                result_data: text_at(row, 4)?,
                source_spectrum_ids: text_at(row, 5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// How `insert_run` steps past a unique collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKey {
    /// `run_seq` is part of the unique key: bump it.
    Sequenced,
    /// `run_seq` exists but the key predates it: suffix `started_at`, keep `run_seq = 0`.
    SuffixWithSeq,
    /// No `run_seq` column: suffix `started_at`.
    Suffix,
}

impl RunKey {
    fn detect(conn: &Connection) -> Result<Self> {
        if !column_exists(conn, "analysis_runs", "run_seq")? {
            return Ok(Self::Suffix);
        }
        Ok(if unique_key_includes(conn, "analysis_runs", "run_seq")? { Self::Sequenced } else { Self::SuffixWithSeq })
    }
}

/// Insert the run row, retrying unique collisions up to
/// [`MAX_RUN_INSERT_ATTEMPTS`] times. Retries bump `run_seq` when the
/// unique key covers it and otherwise append `+<result_id>-<attempt>` to
/// `started_at`.
///
/// Returns `None` once every attempt collided.
fn insert_run(
    conn: &Connection,
    row: &LegacyResult,
    analysis_type: &str,
    started_at: &str,
    context: &str,
    key: RunKey,
) -> Result<Option<i64>> {
    for attempt in 0..MAX_RUN_INSERT_ATTEMPTS {
        let stamp = match key {
            RunKey::Sequenced => started_at.to_owned(),
            RunKey::SuffixWithSeq | RunKey::Suffix if attempt == 0 => started_at.to_owned(),
            RunKey::SuffixWithSeq | RunKey::Suffix => format!("{started_at}+{}-{attempt}", row.result_id),
        };
        let outcome = if key == RunKey::Suffix {
            conn.execute(
                "INSERT INTO analysis_runs (
                    experiment_id, batch_run_item_id, analysis_type, algorithm_version, status,
                    started_at, finished_at, input_context
                 ) VALUES (?1, NULL, ?2, ?3, 'completed', ?4, ?4, ?5)",
                params![row.experiment_id, analysis_type, LEGACY_ALGORITHM_VERSION, stamp, context],
            )
        } else {
            let run_seq = if key == RunKey::Sequenced { attempt } else { 0 };
            conn.execute(
                "INSERT INTO analysis_runs (
                    experiment_id, batch_run_item_id, analysis_type, algorithm_version, status,
                    started_at, finished_at, input_context, run_seq
                 ) VALUES (?1, NULL, ?2, ?3, 'completed', ?4, ?4, ?5, ?6)",
                params![row.experiment_id, analysis_type, LEGACY_ALGORITHM_VERSION, stamp, context, run_seq],
            )
        };
        match outcome {
            Ok(_) => return Ok(Some(conn.last_insert_rowid())),
            Err(err) if is_constraint_violation(&err) => {
                tracing::debug!(result_id = row.result_id, attempt, ?key, "Analysis run collided; retrying");
            },
            Err(err) => return Err(err.into()),
        }
    }
    Ok(None)
}

fn flag_row(conn: &Connection, result_id: i64, flag: QualityFlag, has_flag_column: bool) -> Result<()> {
    if has_flag_column {
        conn.execute(
            "UPDATE analysis_results SET quality_flag = ?1 WHERE result_id = ?2",
            params![flag.as_str(), result_id],
        )?;
    }
    Ok(())
}

pub(super) fn migrate(conn: &Connection) -> Result<RowTally> {
    let pending = load_pending(conn)?;
    let mut tally = RowTally::default();
    if pending.is_empty() {
        return Ok(tally);
    }
    let run_key = RunKey::detect(conn)?;
    let has_flag_column = column_exists(conn, "analysis_results", "quality_flag")?;

    for row in pending {
        if !experiment_exists(conn, row.experiment_id)? {
            tracing::warn!(result_id = row.result_id, "Analysis result references missing experiment");
            flag_row(conn, row.result_id, QualityFlag::MissingExperiment, has_flag_column)?;
            tally.skipped += 1;
            continue;
        }

        let analysis_type = row
            .analysis_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_ANALYSIS_TYPE)
            .to_owned();
        let started_at = timestamp_or_now(row.timestamp.as_deref());
        let context = input_context(&row);

        let Some(run_id) = insert_run(conn, &row, &analysis_type, &started_at, &context, run_key)? else {
            tracing::warn!(result_id = row.result_id, "Analysis run collided on every attempt");
            flag_row(conn, row.result_id, QualityFlag::RunCollision, has_flag_column)?;
            tally.skipped += 1;
            continue;
        };

        let payload = ConfigValue::parse_lenient(row.result_data.as_deref());
        for metric in extract_metrics(&analysis_type, &payload) {
            conn.execute(
                "INSERT INTO analysis_metrics (analysis_run_id, metric_key, metric_value, unit, is_primary)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![run_id, metric.key, metric.value, metric.unit, i64::from(metric.is_primary)],
            )?;
        }

        conn.execute(
            "UPDATE analysis_results SET analysis_run_id = ?1 WHERE result_id = ?2",
            params![run_id, row.result_id],
        )?;
        flag_row(conn, row.result_id, QualityFlag::Good, has_flag_column)?;
        tally.migrated += 1;
    }

    tracing::info!(migrated = tally.migrated, skipped = tally.skipped, "Analysis backfill completed");
    Ok(tally)
}
