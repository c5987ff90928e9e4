//! Read-only composite queries over the normalized schema.
//!
//! Consumed by browsing and reporting front ends. Nothing here writes.
//! A query against a table that a later migration introduces returns an
//! empty result (or `None`) until that migration has been applied.

mod types;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use crate::catalog::table_exists;
use crate::error::Result;
use crate::spectrum_data;
use crate::sql_value::{bytes_at, coerce_to_sql, escape_like_pattern, log_row_error, text_at};

pub use types::*;

/// Query facade borrowing one connection.
#[derive(Debug, Clone, Copy)]
pub struct ExplorerQueries<'a> {
    conn: &'a Connection,
}

impl<'a> ExplorerQueries<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn has_tables(&self, tables: &[&str]) -> Result<bool> {
        for table in tables {
            if !table_exists(self.conn, table)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// All projects, newest first.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_projects(&self) -> Result<Vec<ProjectRow>> {
        if !self.has_tables(&["projects"])? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT project_id, name, status, creation_date
             FROM projects
             ORDER BY creation_date DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProjectRow {
                    project_id: row.get(0)?,
                    name: text_at(row, 1)?.unwrap_or_default(),
                    status: text_at(row, 2)?,
                    creation_date: text_at(row, 3)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(rows)
    }

    /// Experiments of one project, newest first.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_experiments(&self, project_id: i64) -> Result<Vec<ExperimentRow>> {
        if !self.has_tables(&["experiments"])? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT experiment_id, name, status, created_at, updated_at
             FROM experiments
             WHERE project_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(ExperimentRow {
                    experiment_id: row.get(0)?,
                    name: text_at(row, 1)?,
                    status: text_at(row, 2)?,
                    created_at: text_at(row, 3)?,
                    updated_at: text_at(row, 4)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(rows)
    }

    /// Distinct non-empty experiment statuses, sorted.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_experiment_statuses(&self) -> Result<Vec<String>> {
        if !self.has_tables(&["experiments"])? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT status FROM experiments WHERE status IS NOT NULL AND status != '' ORDER BY status",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?.filter_map(log_row_error).collect();
        Ok(rows)
    }

    /// Filtered, sorted experiment listing.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn search_experiments(&self, filter: &ExperimentFilter) -> Result<Vec<ExperimentSearchRow>> {
        if !self.has_tables(&["experiments"])? {
            return Ok(Vec::new());
        }
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let non_blank = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned);

        if let Some(project_id) = filter.project_id {
            clauses.push("project_id = ?");
            values.push(Value::Integer(project_id));
        }
        if let Some(name) = non_blank(&filter.name_contains) {
            clauses.push("name LIKE ? ESCAPE '\\'");
            values.push(Value::Text(format!("%{}%", escape_like_pattern(&name))));
        }
        if let Some(start) = non_blank(&filter.start_date) {
            clauses.push("date(COALESCE(created_at, timestamp)) >= date(?)");
            values.push(Value::Text(start));
        }
        if let Some(end) = non_blank(&filter.end_date) {
            clauses.push("date(COALESCE(created_at, timestamp)) <= date(?)");
            values.push(Value::Text(end));
        }
        if let Some(kind) = non_blank(&filter.experiment_type) {
            clauses.push("type = ?");
            values.push(Value::Text(kind));
        }
        if let Some(status) = non_blank(&filter.status) {
            clauses.push("status = ?");
            values.push(Value::Text(status));
        }
        if let Some(operator) = non_blank(&filter.operator_contains) {
            clauses.push("operator LIKE ? ESCAPE '\\'");
            values.push(Value::Text(format!("%{}%", escape_like_pattern(&operator))));
        }

        let where_sql = if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };
        let direction = if filter.descending { "DESC" } else { "ASC" };
        let mut sql = format!(
            "SELECT experiment_id,
                    (SELECT name FROM projects WHERE projects.project_id = experiments.project_id) AS project_name,
                    name, type, COALESCE(created_at, timestamp) AS created_at, operator, status
             FROM experiments
             {where_sql}
             ORDER BY {} {direction}, experiment_id {direction}",
            filter.sort_by.order_expr()
        );
        if let Some(limit) = filter.limit.filter(|l| *l > 0) {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let bound: Vec<&dyn rusqlite::ToSql> = values.iter().map(coerce_to_sql).collect();
        let rows = stmt
            .query_map(bound.as_slice(), |row| {
                Ok(ExperimentSearchRow {
                    experiment_id: row.get(0)?,
                    project_name: text_at(row, 1)?,
                    name: text_at(row, 2)?,
                    experiment_type: text_at(row, 3)?,
                    created_at: text_at(row, 4)?,
                    operator: text_at(row, 5)?,
                    status: text_at(row, 6)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(rows)
    }

    /// Experiment joined with its project.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_experiment_detail(&self, experiment_id: i64) -> Result<Option<ExperimentDetail>> {
        if !self.has_tables(&["experiments", "projects"])? {
            return Ok(None);
        }
        let detail = self
            .conn
            .query_row(
                "SELECT e.experiment_id, e.project_id, e.name, e.status, e.created_at, e.updated_at,
                        e.type, e.operator, p.name, p.status
                 FROM experiments e
                 LEFT JOIN projects p ON e.project_id = p.project_id
                 WHERE e.experiment_id = ?1",
                params![experiment_id],
                |row| {
                    Ok(ExperimentDetail {
                        experiment_id: row.get(0)?,
                        project_id: row.get(1)?,
                        experiment_name: text_at(row, 2)?,
                        experiment_status: text_at(row, 3)?,
                        created_at: text_at(row, 4)?,
                        updated_at: text_at(row, 5)?,
                        experiment_type: text_at(row, 6)?,
                        operator: text_at(row, 7)?,
                        project_name: text_at(row, 8)?,
                        project_status: text_at(row, 9)?,
                    })
                },
            )
            .optional()?;
        Ok(detail)
    }

    /// Experiment header fields including notes and the legacy timestamp.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_experiment_overview(&self, experiment_id: i64) -> Result<Option<ExperimentOverview>> {
        if !self.has_tables(&["experiments", "projects"])? {
            return Ok(None);
        }
        let overview = self
            .conn
            .query_row(
                "SELECT e.experiment_id, e.name, e.type, e.status, e.operator, e.created_at,
                        e.updated_at, e.timestamp, e.notes, e.project_id, p.name
                 FROM experiments e
                 LEFT JOIN projects p ON p.project_id = e.project_id
                 WHERE e.experiment_id = ?1",
                params![experiment_id],
                |row| {
                    Ok(ExperimentOverview {
                        experiment_id: row.get(0)?,
                        name: text_at(row, 1)?,
                        experiment_type: text_at(row, 2)?,
                        status: text_at(row, 3)?,
                        operator: text_at(row, 4)?,
                        created_at: text_at(row, 5)?,
                        updated_at: text_at(row, 6)?,
                        timestamp: text_at(row, 7)?,
                        notes: text_at(row, 8)?,
                        project_id: row.get(9)?,
                        project_name: text_at(row, 10)?,
                    })
                },
            )
            .optional()?;
        Ok(overview)
    }

    /// Batch runs of one project, most recently started first.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_batch_runs(&self, project_id: i64) -> Result<Vec<BatchRunRow>> {
        if !self.has_tables(&["batch_runs"])? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT batch_run_id, name, status, start_time, end_time
             FROM batch_runs
             WHERE project_id = ?1
             ORDER BY start_time DESC",
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(BatchRunRow {
                    batch_run_id: row.get(0)?,
                    name: text_at(row, 1)?,
                    status: text_at(row, 2)?,
                    start_time: text_at(row, 3)?,
                    end_time: text_at(row, 4)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(rows)
    }

    /// Items of one batch run in plate sequence.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_batch_run_items(&self, batch_run_id: i64) -> Result<Vec<BatchRunItemRow>> {
        if !self.has_tables(&["batch_run_items"])? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT item_id, position_label, status, experiment_id, capture_count, last_captured_at
             FROM batch_run_items
             WHERE batch_run_id = ?1
             ORDER BY sequence_no",
        )?;
        let rows = stmt
            .query_map(params![batch_run_id], |row| {
                Ok(BatchRunItemRow {
                    item_id: row.get(0)?,
                    position_label: text_at(row, 1)?,
                    status: text_at(row, 2)?,
                    experiment_id: row.get(3)?,
                    capture_count: row.get(4)?,
                    last_captured_at: text_at(row, 5)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(rows)
    }

    /// Batch items that produced data for an experiment.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_batch_overview(&self, experiment_id: i64) -> Result<Vec<BatchOverviewRow>> {
        if !self.has_tables(&["batch_runs", "batch_run_items"])? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT bri.item_id, br.batch_run_id, br.name, br.status, bri.position_label,
                    bri.status, bri.capture_count, bri.last_captured_at, bri.metadata_json
             FROM batch_run_items bri
             JOIN batch_runs br ON bri.batch_run_id = br.batch_run_id
             WHERE bri.experiment_id = ?1
             ORDER BY br.start_time DESC, bri.sequence_no",
        )?;
        let rows = stmt
            .query_map(params![experiment_id], |row| {
                Ok(BatchOverviewRow {
                    item_id: row.get(0)?,
                    batch_run_id: row.get(1)?,
                    batch_name: text_at(row, 2)?,
                    batch_status: text_at(row, 3)?,
                    position_label: text_at(row, 4)?,
                    item_status: text_at(row, 5)?,
                    capture_count: row.get(6)?,
                    last_captured_at: text_at(row, 7)?,
                    metadata_json: text_at(row, 8)?,
                })
            })?
            .filter_map(log_row_error)
            .collect();
        Ok(rows)
    }

    /// Capture sets of an experiment, most recent capture first.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_spectrum_sets(&self, experiment_id: i64, limit: Option<u32>) -> Result<Vec<SpectrumSetRow>> {
        if !self.has_tables(&["spectrum_sets"])? {
            return Ok(Vec::new());
        }
        let mut sql = String::from(
            "SELECT spectrum_set_id, capture_label, spectrum_role, result_variant, captured_at,
                    created_at, instrument_state_id, processing_config_id, quality_flag
             FROM spectrum_sets
             WHERE experiment_id = ?1
             ORDER BY captured_at DESC, spectrum_set_id DESC",
        );
        let mut values = vec![Value::Integer(experiment_id)];
        if let Some(limit) = limit.filter(|l| *l > 0) {
            sql.push_str(" LIMIT ?2");
            values.push(Value::Integer(i64::from(limit)));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let bound: Vec<&dyn rusqlite::ToSql> = values.iter().map(coerce_to_sql).collect();
        let rows = stmt.query_map(bound.as_slice(), row_to_spectrum_set)?.filter_map(log_row_error).collect();
        Ok(rows)
    }

    /// Capture set joined with its snapshots.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_spectrum_detail(&self, spectrum_set_id: i64) -> Result<Option<SpectrumDetail>> {
        if !self.has_tables(&["spectrum_sets", "instrument_states", "processing_snapshots"])? {
            return Ok(None);
        }
        let detail = self
            .conn
            .query_row(
                "SELECT ss.spectrum_set_id, ss.capture_label, ss.spectrum_role, ss.result_variant,
                        ss.captured_at, ss.created_at, ss.quality_flag, ss.instrument_state_id,
                        ss.processing_config_id, inst.device_serial, inst.integration_time_ms,
                        inst.temperature, proc.name, proc.version
                 FROM spectrum_sets ss
                 LEFT JOIN instrument_states AS inst ON ss.instrument_state_id = inst.instrument_state_id
                 LEFT JOIN processing_snapshots AS proc ON ss.processing_config_id = proc.processing_config_id
                 WHERE ss.spectrum_set_id = ?1",
                params![spectrum_set_id],
                |row| {
                    Ok(SpectrumDetail {
                        spectrum_set_id: row.get(0)?,
                        capture_label: text_at(row, 1)?,
                        spectrum_role: text_at(row, 2)?,
                        result_variant: text_at(row, 3)?,
                        captured_at: text_at(row, 4)?,
                        created_at: text_at(row, 5)?,
                        quality_flag: text_at(row, 6)?,
                        instrument_state_id: row.get(7)?,
                        processing_config_id: row.get(8)?,
                        instrument_device_serial: text_at(row, 9)?,
                        instrument_integration_ms: row.get(10)?,
                        instrument_temperature: row.get(11)?,
                        processing_name: text_at(row, 12)?,
                        processing_version: text_at(row, 13)?,
                    })
                },
            )
            .optional()?;
        Ok(detail)
    }

    /// Decoded sample arrays of a capture set.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_spectrum_payload(&self, spectrum_set_id: i64) -> Result<Option<SpectrumPayload>> {
        if !self.has_tables(&["spectrum_sets", "spectrum_data"])? {
            return Ok(None);
        }
        let payload = self
            .conn
            .query_row(
                "SELECT ss.spectrum_set_id, sd.data_id, sd.points_count, sd.storage_format, sd.hash,
                        sd.wavelengths_blob, sd.intensities_blob
                 FROM spectrum_sets ss
                 JOIN spectrum_data sd ON sd.data_id = ss.data_id
                 WHERE ss.spectrum_set_id = ?1",
                params![spectrum_set_id],
                |row| {
                    let storage_format: String = row.get(3)?;
                    let wavelengths = bytes_at(row, 5)?.and_then(|b| spectrum_data::decode(&b, &storage_format));
                    let intensities = bytes_at(row, 6)?.and_then(|b| spectrum_data::decode(&b, &storage_format));
                    Ok(SpectrumPayload {
                        spectrum_set_id: row.get(0)?,
                        data_id: row.get(1)?,
                        points_count: row.get(2)?,
                        hash: text_at(row, 4)?,
                        storage_format,
                        wavelengths,
                        intensities,
                    })
                },
            )
            .optional()?;
        Ok(payload)
    }

    /// Analysis runs of an experiment with their metrics, oldest first.
    ///
    /// # Errors
    /// Returns error if database query fails.
    pub fn fetch_analysis_runs(&self, experiment_id: i64) -> Result<Vec<AnalysisRunRow>> {
        if !self.has_tables(&["analysis_runs", "analysis_metrics"])? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT analysis_run_id, analysis_type, algorithm_version, status, started_at,
                    finished_at, input_context
             FROM analysis_runs
             WHERE experiment_id = ?1
             ORDER BY started_at, analysis_run_id",
        )?;
        let mut runs: Vec<AnalysisRunRow> = stmt
            .query_map(params![experiment_id], |row| {
                Ok(AnalysisRunRow {
                    analysis_run_id: row.get(0)?,
                    analysis_type: text_at(row, 1)?,
                    algorithm_version: text_at(row, 2)?,
                    status: text_at(row, 3)?,
                    started_at: text_at(row, 4)?,
                    finished_at: text_at(row, 5)?,
                    input_context: text_at(row, 6)?,
                    metrics: Vec::new(),
                })
            })?
            .filter_map(log_row_error)
            .collect();

        let mut metric_stmt = self.conn.prepare(
            "SELECT metric_key, metric_value, unit, is_primary
             FROM analysis_metrics
             WHERE analysis_run_id = ?1
             ORDER BY rowid",
        )?;
        for run in &mut runs {
            run.metrics = metric_stmt
                .query_map(params![run.analysis_run_id], |row| {
                    Ok(MetricRow {
                        metric_key: text_at(row, 0)?.unwrap_or_default(),
                        metric_value: text_at(row, 1)?,
                        unit: text_at(row, 2)?,
                        is_primary: row.get::<_, Option<i64>>(3)?.unwrap_or(0) != 0,
                    })
                })?
                .filter_map(log_row_error)
                .collect();
        }
        Ok(runs)
    }
}

fn row_to_spectrum_set(row: &Row<'_>) -> rusqlite::Result<SpectrumSetRow> {
    Ok(SpectrumSetRow {
        spectrum_set_id: row.get(0)?,
        capture_label: text_at(row, 1)?,
        spectrum_role: text_at(row, 2)?,
        result_variant: text_at(row, 3)?,
        captured_at: text_at(row, 4)?,
        created_at: text_at(row, 5)?,
        instrument_state_id: row.get(6)?,
        processing_config_id: row.get(7)?,
        quality_flag: text_at(row, 8)?,
    })
}
