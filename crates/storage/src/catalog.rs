//! Existence checks against the SQLite catalog.
//!
//! Identifiers passed here are compile-time constants, never user input.

use rusqlite::{Connection, OptionalExtension as _, params};

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    object_exists(conn, "table", table)
}

pub fn view_exists(conn: &Connection, view: &str) -> Result<bool, rusqlite::Error> {
    object_exists(conn, "view", view)
}

pub fn index_exists(conn: &Connection, index: &str) -> Result<bool, rusqlite::Error> {
    object_exists(conn, "index", index)
}

fn object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool, rusqlite::Error> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2",
            params![kind, name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names of `table`, empty when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?.collect::<Result<_, _>>()?;
    Ok(names)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
    Ok(table_columns(conn, table)?.iter().any(|name| name == column))
}

/// Whether any UNIQUE index or constraint on `table` covers `column`.
pub fn unique_key_includes(conn: &Connection, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA index_list({table})"))?;
    let indexes = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, bool>(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (index, unique) in indexes {
        if !unique {
            continue;
        }
        let mut info = conn.prepare(&format!("PRAGMA index_info(\"{index}\")"))?;
        let columns = info.query_map([], |row| row.get::<_, Option<String>>(2))?.collect::<Result<Vec<_>, _>>()?;
        if columns.iter().flatten().any(|name| name == column) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Add a column unless the table lacks or already has it. Returns whether DDL ran.
pub fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool, rusqlite::Error> {
    if !table_exists(conn, table)? || column_exists(conn, table, column)? {
        return Ok(false);
    }
    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"), [])?;
    Ok(true)
}

/// Run `ddl` unless `table` already exists. Returns whether DDL ran.
pub fn create_table_if_missing(
    conn: &Connection,
    table: &str,
    ddl: &str,
) -> Result<bool, rusqlite::Error> {
    if table_exists(conn, table)? {
        return Ok(false);
    }
    conn.execute_batch(ddl)?;
    Ok(true)
}

/// Run `ddl` unless the index exists or its table is absent. Returns whether DDL ran.
pub fn create_index_if_missing(
    conn: &Connection,
    index: &str,
    table: &str,
    ddl: &str,
) -> Result<bool, rusqlite::Error> {
    if !table_exists(conn, table)? || index_exists(conn, index)? {
        return Ok(false);
    }
    conn.execute_batch(ddl)?;
    Ok(true)
}

/// `" AND is_active = 1"` once the soft-delete column exists, empty before.
pub fn active_filter(conn: &Connection, table: &str) -> Result<&'static str, rusqlite::Error> {
    Ok(if column_exists(conn, table, "is_active")? { " AND is_active = 1" } else { "" })
}

/// `SELECT COUNT(*)` helper returning `u64`.
pub fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<u64, rusqlite::Error> {
    let value: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(u64::try_from(value).unwrap_or(0))
}
