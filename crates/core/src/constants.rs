//! Shared constants for nanosense.

/// Default minimum age, in days, before an unreferenced snapshot is deactivated.
pub const DEFAULT_CLEANUP_AGE_DAYS: i64 = 180;

/// Default number of duplicate buckets listed per table in reports.
pub const DEFAULT_TOP_DUPLICATES: usize = 10;

/// Attempts made to insert one backfilled analysis run before giving up.
pub const MAX_RUN_INSERT_ATTEMPTS: u32 = 5;

/// SQLite busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Environment variable overriding the database location.
pub const ENV_DB_PATH: &str = "NANOSENSE_DB_PATH";

/// Environment variable overriding [`DEFAULT_CLEANUP_AGE_DAYS`].
pub const ENV_CLEANUP_AGE_DAYS: &str = "NANOSENSE_CLEANUP_AGE_DAYS";

/// Environment variable overriding [`DEFAULT_TOP_DUPLICATES`].
pub const ENV_TOP_DUPLICATES: &str = "NANOSENSE_TOP_DUPLICATES";

/// Application data directory under the user's home.
pub const APP_DIR_NAME: &str = ".nanosense";

/// Database file name inside [`APP_DIR_NAME`].
pub const DEFAULT_DB_FILE: &str = "nanosense_data.db";

/// Settings file inside [`APP_DIR_NAME`].
pub const CONFIG_FILE: &str = "config.json";

/// Markdown report written by the snapshot analysis.
pub const SNAPSHOT_REPORT_FILE: &str = "snapshot_report.md";

/// Per-table metric rows.
pub const SNAPSHOT_SUMMARY_CSV: &str = "snapshot_summary.csv";

/// Duplicate bucket rows.
pub const SNAPSHOT_DUPLICATES_CSV: &str = "snapshot_duplicates.csv";
