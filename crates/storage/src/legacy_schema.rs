//! Pre-normalization application schema.
//!
//! Fresh stores start from these four tables so the built-in migrations have
//! something to extend; existing stores already have them.

use rusqlite::Connection;

pub const SQL: &str = "
CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    creation_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS experiments (
    experiment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER,
    name TEXT NOT NULL,
    type TEXT,
    timestamp TEXT NOT NULL,
    operator TEXT,
    notes TEXT,
    config_snapshot TEXT,
    FOREIGN KEY (project_id) REFERENCES projects (project_id)
);

CREATE TABLE IF NOT EXISTS spectra (
    spectrum_id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER,
    type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    wavelengths TEXT,
    intensities TEXT,
    FOREIGN KEY (experiment_id) REFERENCES experiments (experiment_id)
);

CREATE TABLE IF NOT EXISTS analysis_results (
    result_id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER,
    analysis_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    result_data TEXT,
    source_spectrum_ids TEXT,
    FOREIGN KEY (experiment_id) REFERENCES experiments (experiment_id)
);
";

/// Create the legacy tables when missing.
///
/// # Errors
/// Returns error if the DDL fails.
pub fn ensure_legacy_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SQL)
}
