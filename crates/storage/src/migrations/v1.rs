//! Migration 0001: normalized phase-1 schema plus legacy backfill.
//!
//! Structural phase first (tables, added columns, indexes, each checked
//! against the catalog), then experiment metadata, version seeding and the
//! row-by-row data phase.

use nanosense_core::timestamp::now_timestamp;
use rusqlite::{Connection, params};

use crate::backfill;
use crate::catalog::{add_column_if_missing, create_index_if_missing, create_table_if_missing};
use crate::error::Result;

pub const MIGRATION_ID: &str = "0001_prepare_phase1_schema";

/// `(table, ddl)` for every table introduced by this migration.
pub(super) const NEW_TABLES: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT,
            email TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT
        )",
    ),
    (
        "roles",
        "CREATE TABLE roles (
            role_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        )",
    ),
    (
        "user_roles",
        "CREATE TABLE user_roles (
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            role_id INTEGER NOT NULL REFERENCES roles(role_id) ON DELETE CASCADE,
            assigned_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, role_id)
        )",
    ),
    (
        "user_preferences",
        "CREATE TABLE user_preferences (
            user_id INTEGER PRIMARY KEY REFERENCES users(user_id) ON DELETE CASCADE,
            preferences_json TEXT NOT NULL DEFAULT '{}',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    ),
    (
        "samples",
        "CREATE TABLE samples (
            sample_id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER REFERENCES projects(project_id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            external_id TEXT,
            type TEXT,
            concentration REAL,
            concentration_unit TEXT,
            source TEXT,
            storage_conditions TEXT,
            metadata_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT
        )",
    ),
    (
        "batch_runs",
        "CREATE TABLE batch_runs (
            batch_run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER REFERENCES projects(project_id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            layout_reference TEXT,
            operator TEXT,
            instrument_config_id INTEGER,
            start_time TEXT,
            end_time TEXT,
            status TEXT NOT NULL DEFAULT 'draft',
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT
        )",
    ),
    (
        "batch_run_items",
        "CREATE TABLE batch_run_items (
            item_id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_run_id INTEGER NOT NULL REFERENCES batch_runs(batch_run_id) ON DELETE CASCADE,
            position_label TEXT NOT NULL,
            sequence_no INTEGER NOT NULL,
            sample_id INTEGER REFERENCES samples(sample_id),
            planned_stage TEXT,
            actual_stage TEXT,
            experiment_id INTEGER REFERENCES experiments(experiment_id) ON DELETE SET NULL,
            capture_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            last_captured_at TEXT,
            metadata_json TEXT,
            UNIQUE (batch_run_id, position_label, planned_stage)
        )",
    ),
    (
        "instrument_states",
        "CREATE TABLE instrument_states (
            instrument_state_id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_serial TEXT,
            integration_time_ms REAL,
            averaging INTEGER,
            temperature REAL,
            config_json TEXT,
            captured_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    ),
    (
        "processing_snapshots",
        "CREATE TABLE processing_snapshots (
            processing_config_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            version TEXT,
            parameters_json TEXT NOT NULL,
            created_by INTEGER REFERENCES users(user_id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    ),
    (
        "spectrum_data",
        "CREATE TABLE spectrum_data (
            data_id INTEGER PRIMARY KEY AUTOINCREMENT,
            wavelengths_blob BLOB NOT NULL,
            intensities_blob BLOB NOT NULL,
            points_count INTEGER NOT NULL,
            hash TEXT,
            storage_format TEXT NOT NULL DEFAULT 'npy',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    ),
    (
        "spectrum_sets",
        "CREATE TABLE spectrum_sets (
            spectrum_set_id INTEGER PRIMARY KEY AUTOINCREMENT,
            experiment_id INTEGER REFERENCES experiments(experiment_id) ON DELETE CASCADE,
            batch_run_item_id INTEGER REFERENCES batch_run_items(item_id) ON DELETE SET NULL,
            capture_label TEXT NOT NULL,
            spectrum_role TEXT,
            result_variant TEXT,
            data_id INTEGER NOT NULL REFERENCES spectrum_data(data_id) ON DELETE CASCADE,
            instrument_state_id INTEGER REFERENCES instrument_states(instrument_state_id),
            processing_config_id INTEGER REFERENCES processing_snapshots(processing_config_id),
            captured_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            region_start_nm REAL,
            region_end_nm REAL,
            note TEXT,
            quality_flag TEXT DEFAULT 'good'
        )",
    ),
    (
        "analysis_runs",
        "CREATE TABLE analysis_runs (
            analysis_run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            experiment_id INTEGER REFERENCES experiments(experiment_id) ON DELETE CASCADE,
            batch_run_item_id INTEGER REFERENCES batch_run_items(item_id) ON DELETE SET NULL,
            analysis_type TEXT NOT NULL,
            algorithm_version TEXT,
            status TEXT NOT NULL DEFAULT 'completed',
            started_at TEXT NOT NULL DEFAULT (datetime('now')),
            finished_at TEXT,
            initiated_by INTEGER REFERENCES users(user_id),
            input_context TEXT,
            run_seq INTEGER NOT NULL DEFAULT 0,
            UNIQUE (experiment_id, analysis_type, started_at, run_seq)
        )",
    ),
    (
        "analysis_metrics",
        "CREATE TABLE analysis_metrics (
            analysis_run_id INTEGER REFERENCES analysis_runs(analysis_run_id) ON DELETE CASCADE,
            metric_key TEXT NOT NULL,
            metric_value TEXT,
            unit TEXT,
            is_primary INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (analysis_run_id, metric_key)
        )",
    ),
    (
        "analysis_artifacts",
        "CREATE TABLE analysis_artifacts (
            artifact_id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_run_id INTEGER REFERENCES analysis_runs(analysis_run_id) ON DELETE CASCADE,
            artifact_type TEXT NOT NULL,
            file_path TEXT,
            data_blob BLOB,
            mime_type TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            description TEXT
        )",
    ),
    (
        "attachments",
        "CREATE TABLE attachments (
            attachment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            file_path TEXT,
            file_hash TEXT,
            mime_type TEXT,
            size_bytes INTEGER,
            uploaded_by INTEGER REFERENCES users(user_id),
            description TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    ),
    (
        "tags",
        "CREATE TABLE tags (
            tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            color TEXT,
            description TEXT
        )",
    ),
    (
        "entity_tags",
        "CREATE TABLE entity_tags (
            tag_id INTEGER NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            applied_by INTEGER REFERENCES users(user_id),
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (tag_id, entity_type, entity_id)
        )",
    ),
    (
        "experiment_versions",
        "CREATE TABLE experiment_versions (
            experiment_version_id INTEGER PRIMARY KEY AUTOINCREMENT,
            experiment_id INTEGER NOT NULL REFERENCES experiments(experiment_id) ON DELETE CASCADE,
            version_no INTEGER NOT NULL,
            snapshot_json TEXT NOT NULL,
            created_by INTEGER REFERENCES users(user_id),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            diff_summary TEXT,
            UNIQUE (experiment_id, version_no)
        )",
    ),
    (
        "audit_logs",
        "CREATE TABLE audit_logs (
            audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            actor_id INTEGER REFERENCES users(user_id),
            payload_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    ),
];

/// `(table, column, definition)` added to pre-existing tables.
pub(super) const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("projects", "status", "TEXT NOT NULL DEFAULT 'active'"),
    ("projects", "owner_user_id", "INTEGER REFERENCES users(user_id)"),
    ("projects", "metadata_json", "TEXT"),
    ("experiments", "batch_run_id", "INTEGER REFERENCES batch_runs(batch_run_id)"),
    ("experiments", "sample_id", "INTEGER REFERENCES samples(sample_id)"),
    ("experiments", "status", "TEXT NOT NULL DEFAULT 'draft'"),
    ("experiments", "created_at", "TEXT"),
    ("experiments", "updated_at", "TEXT"),
    ("experiments", "version", "INTEGER NOT NULL DEFAULT 1"),
    (
        "experiments",
        "processing_config_id",
        "INTEGER REFERENCES processing_snapshots(processing_config_id)",
    ),
    ("spectra", "spectrum_set_id", "INTEGER REFERENCES spectrum_sets(spectrum_set_id)"),
    ("spectra", "data_id", "INTEGER REFERENCES spectrum_data(data_id)"),
    ("spectra", "quality_flag", "TEXT DEFAULT 'good'"),
    ("spectra", "created_at", "TEXT"),
    ("analysis_results", "analysis_run_id", "INTEGER REFERENCES analysis_runs(analysis_run_id)"),
    ("analysis_results", "quality_flag", "TEXT"),
    // analysis_runs created by an earlier schema revision lacks the sequence column
    ("analysis_runs", "run_seq", "INTEGER NOT NULL DEFAULT 0"),
];

/// `(index, table, ddl)` for normalized and legacy tables.
pub(super) const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_samples_project", "samples", "CREATE INDEX idx_samples_project ON samples(project_id)"),
    (
        "idx_samples_external_id",
        "samples",
        "CREATE INDEX idx_samples_external_id ON samples(external_id)",
    ),
    (
        "idx_batch_runs_project",
        "batch_runs",
        "CREATE INDEX idx_batch_runs_project ON batch_runs(project_id)",
    ),
    ("idx_batch_runs_status", "batch_runs", "CREATE INDEX idx_batch_runs_status ON batch_runs(status)"),
    (
        "idx_batch_run_items_batch",
        "batch_run_items",
        "CREATE INDEX idx_batch_run_items_batch ON batch_run_items(batch_run_id)",
    ),
    (
        "idx_batch_run_items_experiment",
        "batch_run_items",
        "CREATE INDEX idx_batch_run_items_experiment ON batch_run_items(experiment_id)",
    ),
    (
        "idx_spectrum_sets_experiment",
        "spectrum_sets",
        "CREATE INDEX idx_spectrum_sets_experiment ON spectrum_sets(experiment_id, captured_at)",
    ),
    (
        "idx_spectrum_sets_label",
        "spectrum_sets",
        "CREATE INDEX idx_spectrum_sets_label ON spectrum_sets(capture_label)",
    ),
    (
        "idx_analysis_runs_type",
        "analysis_runs",
        "CREATE INDEX idx_analysis_runs_type ON analysis_runs(analysis_type)",
    ),
    (
        "idx_analysis_runs_started",
        "analysis_runs",
        "CREATE INDEX idx_analysis_runs_started ON analysis_runs(started_at)",
    ),
    (
        "idx_attachments_entity",
        "attachments",
        "CREATE INDEX idx_attachments_entity ON attachments(entity_type, entity_id)",
    ),
    (
        "idx_entity_tags_entity",
        "entity_tags",
        "CREATE INDEX idx_entity_tags_entity ON entity_tags(entity_type, entity_id)",
    ),
    (
        "idx_audit_logs_entity",
        "audit_logs",
        "CREATE INDEX idx_audit_logs_entity ON audit_logs(entity_type, entity_id)",
    ),
    ("idx_audit_logs_action", "audit_logs", "CREATE INDEX idx_audit_logs_action ON audit_logs(action)"),
    (
        "idx_experiments_timestamp",
        "experiments",
        "CREATE INDEX idx_experiments_timestamp ON experiments(timestamp)",
    ),
    ("idx_experiments_status", "experiments", "CREATE INDEX idx_experiments_status ON experiments(status)"),
    ("idx_spectra_experiment", "spectra", "CREATE INDEX idx_spectra_experiment ON spectra(experiment_id)"),
    ("idx_spectra_set", "spectra", "CREATE INDEX idx_spectra_set ON spectra(spectrum_set_id)"),
];

pub(super) fn apply(conn: &Connection) -> Result<()> {
    apply_structure(conn)?;
    populate_experiment_metadata(conn)?;
    seed_experiment_versions(conn)?;
    backfill::run(conn)?;
    Ok(())
}

fn apply_structure(conn: &Connection) -> Result<()> {
    let mut created = 0_usize;
    for (table, ddl) in NEW_TABLES {
        if create_table_if_missing(conn, table, ddl)? {
            created += 1;
        }
    }
    let mut added = 0_usize;
    for (table, column, definition) in ADDED_COLUMNS {
        if add_column_if_missing(conn, table, column, definition)? {
            added += 1;
        }
    }
    let mut indexed = 0_usize;
    for (index, table, ddl) in INDEXES {
        if create_index_if_missing(conn, index, table, ddl)? {
            indexed += 1;
        }
    }
    tracing::info!(tables = created, columns = added, indexes = indexed, "Phase 1 structure applied");
    Ok(())
}

fn populate_experiment_metadata(conn: &Connection) -> Result<()> {
    let now = now_timestamp();
    conn.execute(
        "UPDATE experiments
         SET created_at = COALESCE(created_at, timestamp, ?1),
             updated_at = COALESCE(updated_at, timestamp, ?1)",
        params![now],
    )?;
    conn.execute(
        "UPDATE experiments
         SET status = 'completed'
         WHERE status IS NULL OR TRIM(status) = '' OR status = 'draft'",
        [],
    )?;
    Ok(())
}

fn seed_experiment_versions(conn: &Connection) -> Result<()> {
    let seeded = conn.execute(
        "INSERT OR IGNORE INTO experiment_versions (experiment_id, version_no, snapshot_json, created_at)
         SELECT experiment_id, 1, json_object('legacy_seed', 1), ?1
         FROM experiments",
        params![now_timestamp()],
    )?;
    tracing::debug!(seeded, "Experiment versions seeded");
    Ok(())
}
