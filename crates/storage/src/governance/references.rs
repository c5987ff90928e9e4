use std::collections::HashMap;

use rusqlite::Connection;

use super::SnapshotTable;
use crate::catalog::column_exists;
use crate::error::Result;
use crate::sql_value::log_row_error;

/// Number of rows pointing at each snapshot id, summed over every
/// referencing table. Referencing tables or columns that do not exist yet
/// contribute nothing.
///
/// # Errors
/// Returns error if database query fails.
pub fn reference_counts(conn: &Connection, table: SnapshotTable) -> Result<HashMap<i64, u64>> {
    let mut counts: HashMap<i64, u64> = HashMap::new();
    for (source, column) in table.referencing_columns() {
        if !column_exists(conn, source, column)? {
            continue;
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM {source} WHERE {column} IS NOT NULL GROUP BY {column}"
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(log_row_error);
        for (id, n) in rows {
            *counts.entry(id).or_default() += u64::try_from(n).unwrap_or(0);
        }
    }
    Ok(counts)
}
