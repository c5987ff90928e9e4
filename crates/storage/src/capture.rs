//! Live capture writer.
//!
//! Stores a freshly acquired spectrum in the normalized tables and resolves
//! its instrument and processing snapshots through get-or-create on the
//! canonical serialization, so recurring configurations share one row.
//! Only active snapshot rows are matched; deactivated rows are never reused.

use nanosense_core::snapshot::{canonicalize_instrument_map, canonicalize_processing, serialize, serialize_value};
use nanosense_core::timestamp::{now_timestamp, timestamp_or_now};
use nanosense_core::{CaptureRole, ConfigValue, QualityFlag};
use rusqlite::{Connection, OptionalExtension as _, params};
use serde::Serialize;

use crate::catalog::active_filter;
use crate::error::{Result, StorageError};
use crate::spectrum_data;
use crate::sql_value::scalar_param;

const UNSPECIFIED_PROCESSING: &str = "unspecified";
const DEFAULT_PROCESSING_VERSION: &str = "1.0";

/// A spectrum about to be written.
#[derive(Debug, Clone, Default)]
pub struct NewCapture {
    pub experiment_id: i64,
    pub batch_run_item_id: Option<i64>,
    /// Legacy type label (`Signal`, `Background`, `Result_<variant>`, ...).
    pub label: Option<String>,
    /// Capture time; blank means now.
    pub captured_at: Option<String>,
    pub wavelengths: Vec<f64>,
    pub intensities: Vec<f64>,
    /// Flat instrument map: `device_serial`, `integration_time_ms`,
    /// `averaging`, `temperature` plus arbitrary configuration keys.
    pub instrument: Option<ConfigValue>,
    /// Processing map: `name`, `version` plus arbitrary parameters.
    pub processing: Option<ConfigValue>,
}

/// Row ids written or reused for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureIds {
    pub data_id: i64,
    pub spectrum_set_id: i64,
    pub spectrum_id: i64,
    pub instrument_state_id: Option<i64>,
    pub processing_config_id: Option<i64>,
}

/// Write one capture: payload record, capture set and a legacy `spectra`
/// row already carrying its forward pointers.
///
/// # Errors
/// Returns [`StorageError::InvalidInput`] when the sample arrays differ in
/// length, or a database error.
pub fn record_capture(conn: &Connection, capture: &NewCapture) -> Result<CaptureIds> {
    if capture.wavelengths.len() != capture.intensities.len() {
        return Err(StorageError::InvalidInput(format!(
            "{} wavelengths vs {} intensities",
            capture.wavelengths.len(),
            capture.intensities.len()
        )));
    }
    let captured_at = timestamp_or_now(capture.captured_at.as_deref());

    let data_id = spectrum_data::insert(conn, &capture.wavelengths, &capture.intensities, &captured_at)?;
    let instrument_state_id =
        capture.instrument.as_ref().filter(|v| v.is_truthy()).map(|v| resolve_instrument_state(conn, v)).transpose()?;
    let processing_config_id =
        capture.processing.as_ref().filter(|v| v.is_truthy()).map(|v| resolve_processing_snapshot(conn, v)).transpose()?;

    let role = CaptureRole::derive(capture.label.as_deref());
    conn.execute(
        "INSERT INTO spectrum_sets (
            experiment_id, batch_run_item_id, capture_label, spectrum_role, result_variant,
            data_id, instrument_state_id, processing_config_id, captured_at, created_at, quality_flag
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10)",
        params![
            capture.experiment_id,
            capture.batch_run_item_id,
            role.capture_label,
            role.spectrum_role,
            role.result_variant,
            data_id,
            instrument_state_id,
            processing_config_id,
            captured_at,
            QualityFlag::Good.as_str()
        ],
    )?;
    let spectrum_set_id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO spectra (
            experiment_id, type, timestamp, wavelengths, intensities,
            spectrum_set_id, data_id, quality_flag, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?3)",
        params![
            capture.experiment_id,
            role.capture_label,
            captured_at,
            serde_json::to_string(&capture.wavelengths)?,
            serde_json::to_string(&capture.intensities)?,
            spectrum_set_id,
            data_id,
            QualityFlag::Good.as_str()
        ],
    )?;
    let spectrum_id = conn.last_insert_rowid();

    tracing::debug!(spectrum_set_id, data_id, ?instrument_state_id, ?processing_config_id, "Capture recorded");
    Ok(CaptureIds { data_id, spectrum_set_id, spectrum_id, instrument_state_id, processing_config_id })
}

/// Id of the active instrument state matching `info`, creating it when absent.
///
/// # Errors
/// Returns error if the lookup or insert fails.
pub fn resolve_instrument_state(conn: &Connection, info: &ConfigValue) -> Result<i64> {
    let config_json = serialize(&canonicalize_instrument_map(info));
    let sql = format!(
        "SELECT instrument_state_id FROM instrument_states WHERE config_json = ?1{} \
         ORDER BY instrument_state_id LIMIT 1",
        active_filter(conn, "instrument_states")?
    );
    if let Some(id) = conn.query_row(&sql, params![config_json], |row| row.get::<_, i64>(0)).optional()? {
        return Ok(id);
    }
    let scalar = |key: &str| scalar_param(info.get(key));
    conn.execute(
        "INSERT INTO instrument_states (
            device_serial, integration_time_ms, averaging, temperature, config_json, captured_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            scalar("device_serial"),
            scalar("integration_time_ms"),
            scalar("averaging"),
            scalar("temperature"),
            config_json,
            now_timestamp()
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(instrument_state_id = id, "Created instrument state");
    Ok(id)
}

/// Id of the active processing snapshot matching `info`, creating it when absent.
///
/// Missing name and version default to `unspecified` and `1.0`.
///
/// # Errors
/// Returns error if the lookup or insert fails.
pub fn resolve_processing_snapshot(conn: &Connection, info: &ConfigValue) -> Result<i64> {
    let name = label_or(info.get("name"), UNSPECIFIED_PROCESSING);
    let version = label_or(info.get("version"), DEFAULT_PROCESSING_VERSION);
    let canonical = canonicalize_processing(info);
    let parameters_json = canonical.get("parameters").map_or_else(|| "{}".to_owned(), serialize_value);
    let sql = format!(
        "SELECT processing_config_id FROM processing_snapshots
         WHERE name = ?1 AND version = ?2 AND parameters_json = ?3{}
         ORDER BY processing_config_id LIMIT 1",
        active_filter(conn, "processing_snapshots")?
    );
    let existing = conn
        .query_row(&sql, params![name, version, parameters_json], |row| row.get::<_, i64>(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO processing_snapshots (name, version, parameters_json, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, version, parameters_json, now_timestamp()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(processing_config_id = id, %name, %version, "Created processing snapshot");
    Ok(id)
}

/// Text of a truthy label value, numbers and containers rendered, else `default`.
fn label_or(value: Option<&ConfigValue>, default: &str) -> String {
    value
        .filter(|v| v.is_truthy())
        .and_then(|v| match v {
            ConfigValue::Text(text) => Some(text.clone()),
            other => other.metric_text().map(|(text, _)| text),
        })
        .unwrap_or_else(|| default.to_owned())
}
