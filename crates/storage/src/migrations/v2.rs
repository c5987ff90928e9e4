//! Migration 0002: soft-delete flag on snapshot tables.

use rusqlite::Connection;

use crate::catalog::add_column_if_missing;
use crate::error::Result;

pub const MIGRATION_ID: &str = "0002_snapshot_soft_delete";

pub(super) const SNAPSHOT_TABLES: [&str; 2] = ["instrument_states", "processing_snapshots"];

pub(super) const IS_ACTIVE_DEF: &str = "INTEGER NOT NULL DEFAULT 1";

pub(super) fn apply(conn: &Connection) -> Result<()> {
    let mut added = false;
    for table in SNAPSHOT_TABLES {
        added |= add_column_if_missing(conn, table, "is_active", IS_ACTIVE_DEF)?;
    }
    if added {
        for table in SNAPSHOT_TABLES {
            conn.execute(&format!("UPDATE {table} SET is_active = 1 WHERE is_active IS NULL"), [])?;
        }
    }
    Ok(())
}
