//! Test utilities and module declarations for storage tests.
#![expect(clippy::unwrap_used, reason = "test code")]

use rusqlite::{Connection, params};
use tempfile::TempDir;

use crate::Store;
use crate::legacy_schema::ensure_legacy_schema;

/// Fully migrated store in a temp directory.
pub fn create_test_store() -> (Store, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let store = Store::open(&db_path).unwrap();
    (store, temp_dir)
}

/// Pre-normalization store: legacy tables only, no migrations applied.
pub fn create_legacy_conn() -> (Connection, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let conn = Connection::open(temp_dir.path().join("legacy.db")).unwrap();
    conn.execute_batch("PRAGMA foreign_keys = OFF;").unwrap();
    ensure_legacy_schema(&conn).unwrap();
    (conn, temp_dir)
}

pub fn insert_project(conn: &Connection, name: &str) -> i64 {
    conn.execute(
        "INSERT INTO projects (name, description, creation_date) VALUES (?1, 'test', '2024-01-01 00:00:00')",
        params![name],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_experiment(conn: &Connection, project_id: Option<i64>, name: &str, timestamp: &str) -> i64 {
    conn.execute(
        "INSERT INTO experiments (project_id, name, type, timestamp, operator) VALUES (?1, ?2, 'Kinetics', ?3, 'alice')",
        params![project_id, name, timestamp],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_legacy_spectrum(
    conn: &Connection,
    experiment_id: i64,
    label: &str,
    wavelengths: &str,
    intensities: &str,
) -> i64 {
    conn.execute(
        "INSERT INTO spectra (experiment_id, type, timestamp, wavelengths, intensities)
         VALUES (?1, ?2, '2024-03-01 10:00:00', ?3, ?4)",
        params![experiment_id, label, wavelengths, intensities],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_legacy_result(conn: &Connection, experiment_id: i64, analysis_type: &str, timestamp: &str, data: &str) -> i64 {
    conn.execute(
        "INSERT INTO analysis_results (experiment_id, analysis_type, timestamp, result_data) VALUES (?1, ?2, ?3, ?4)",
        params![experiment_id, analysis_type, timestamp, data],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_instrument_state(conn: &Connection, serial: &str, temperature: f64, config_json: &str, captured_at: &str) -> i64 {
    conn.execute(
        "INSERT INTO instrument_states (device_serial, integration_time_ms, averaging, temperature, config_json, captured_at)
         VALUES (?1, 100.0, 4, ?2, ?3, ?4)",
        params![serial, temperature, config_json, captured_at],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_processing_snapshot(conn: &Connection, name: &str, parameters_json: &str, created_at: &str) -> i64 {
    conn.execute(
        "INSERT INTO processing_snapshots (name, version, parameters_json, created_at) VALUES (?1, '1.0', ?2, ?3)",
        params![name, parameters_json, created_at],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// Point one capture set at the given snapshot rows.
pub fn reference_snapshots(
    conn: &Connection,
    experiment_id: i64,
    instrument_state_id: Option<i64>,
    processing_config_id: Option<i64>,
) -> i64 {
    conn.execute(
        "INSERT INTO spectrum_data (wavelengths_blob, intensities_blob, points_count, storage_format)
         VALUES ('[1.0]', '[2.0]', 1, 'json')",
        [],
    )
    .unwrap();
    let data_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO spectrum_sets (experiment_id, capture_label, data_id, instrument_state_id, processing_config_id, captured_at)
         VALUES (?1, 'Signal', ?2, ?3, ?4, '2024-01-01 00:00:00')",
        params![experiment_id, data_id, instrument_state_id, processing_config_id],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn query_i64(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

pub fn query_text(conn: &Connection, sql: &str) -> Option<String> {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

mod backfill_tests;
mod capture_tests;
mod cleanup_tests;
mod migration_tests;
mod validation_tests;
