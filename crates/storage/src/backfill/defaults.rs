//! Placeholder snapshots referenced by backfilled capture sets.
//!
//! Legacy spectra carry no instrument or processing information, so every
//! migrated row points at one shared default of each kind.

use nanosense_core::ConfigValue;
use nanosense_core::snapshot::serialize_value;
use nanosense_core::timestamp::now_timestamp;
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::catalog::active_filter;
use crate::error::Result;

pub const DEFAULT_INSTRUMENT_SERIAL: &str = "legacy_unknown";
pub const DEFAULT_PROCESSING_NAME: &str = "legacy_default";
pub const DEFAULT_PROCESSING_VERSION: &str = "1.0";

fn default_instrument_config() -> String {
    serialize_value(&ConfigValue::map([("source", ConfigValue::from("legacy_default"))]))
}

fn default_processing_parameters() -> String {
    serialize_value(&ConfigValue::map([("source", ConfigValue::from("pre_phase1"))]))
}

/// Id of the default processing snapshot, creating it on first use.
///
/// # Errors
/// Returns error if the lookup or insert fails.
pub fn ensure_default_processing_snapshot(conn: &Connection) -> Result<i64> {
    let sql = format!(
        "SELECT processing_config_id FROM processing_snapshots
         WHERE name = ?1 AND version = ?2{}
         ORDER BY processing_config_id LIMIT 1",
        active_filter(conn, "processing_snapshots")?
    );
    let existing = conn
        .query_row(&sql, params![DEFAULT_PROCESSING_NAME, DEFAULT_PROCESSING_VERSION], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO processing_snapshots (name, version, parameters_json, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            DEFAULT_PROCESSING_NAME,
            DEFAULT_PROCESSING_VERSION,
            default_processing_parameters(),
            now_timestamp()
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(processing_config_id = id, "Created default processing snapshot");
    Ok(id)
}

/// Id of the default instrument state, creating it on first use.
///
/// # Errors
/// Returns error if the lookup or insert fails.
pub fn ensure_default_instrument_state(conn: &Connection) -> Result<i64> {
    let config_json = default_instrument_config();
    let sql = format!(
        "SELECT instrument_state_id FROM instrument_states
         WHERE device_serial = ?1 AND config_json = ?2{}
         ORDER BY instrument_state_id LIMIT 1",
        active_filter(conn, "instrument_states")?
    );
    let existing = conn
        .query_row(&sql, params![DEFAULT_INSTRUMENT_SERIAL, config_json], |row| row.get::<_, i64>(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO instrument_states (device_serial, config_json, captured_at) VALUES (?1, ?2, ?3)",
        params![DEFAULT_INSTRUMENT_SERIAL, config_json, now_timestamp()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(instrument_state_id = id, "Created default instrument state");
    Ok(id)
}
