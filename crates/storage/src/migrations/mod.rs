//! Named, transactional schema migrations.
//!
//! A [`MigrationRegistry`] holds an ordered list of units. The bookkeeping
//! table `schema_migrations` records every id that committed; presence of a
//! row is the only signal that a unit is applied.

mod v1;
mod v2;
mod v3;

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::{Result, StorageError};

pub use v1::MIGRATION_ID as PREPARE_PHASE1_SCHEMA;
pub use v2::MIGRATION_ID as SNAPSHOT_SOFT_DELETE;
pub use v3::MIGRATION_ID as LEGACY_COMPAT_VIEWS;

/// Bookkeeping table name.
pub const SCHEMA_MIGRATIONS_TABLE: &str = "schema_migrations";

const BOOKKEEPING_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    migration_id TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL
)";

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static MIGRATION_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}_[a-z0-9_]+$").unwrap());

/// Apply function of a migration unit. Runs inside the runner's transaction.
pub type MigrationFn = fn(&Connection) -> Result<()>;

/// One registered migration unit.
#[derive(Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub apply: MigrationFn,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Applied state of one registered unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub id: String,
    pub applied_at: Option<String>,
}

/// Ordered set of migration units. Order is registration order.
#[derive(Debug, Default, Clone)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in units in their release order.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            migrations: vec![
                Migration { id: v1::MIGRATION_ID, apply: v1::apply },
                Migration { id: v2::MIGRATION_ID, apply: v2::apply },
                Migration { id: v3::MIGRATION_ID, apply: v3::apply },
            ],
        }
    }

    /// Append a unit.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidMigration`] when the id is malformed
    /// (`NNNN_snake_case`) or already registered.
    pub fn register(&mut self, id: &'static str, apply: MigrationFn) -> Result<&mut Self> {
        if !MIGRATION_ID_REGEX.is_match(id) {
            return Err(StorageError::InvalidMigration(format!(
                "id {id:?} must look like 0001_snake_case"
            )));
        }
        if self.migrations.iter().any(|m| m.id == id) {
            return Err(StorageError::InvalidMigration(format!("id {id:?} registered twice")));
        }
        self.migrations.push(Migration { id, apply });
        Ok(self)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.migrations.iter().map(|m| m.id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Units not yet recorded in the bookkeeping table, in registration order.
    ///
    /// Creates the bookkeeping table if needed.
    ///
    /// # Errors
    /// Returns error if the bookkeeping table cannot be created or read.
    pub fn get_pending(&self, conn: &Connection) -> Result<Vec<Migration>> {
        ensure_bookkeeping(conn)?;
        let applied = applied_ids(conn)?;
        Ok(self.migrations.iter().filter(|m| !applied.contains(m.id)).copied().collect())
    }

    /// Apply every pending unit, each in its own transaction.
    ///
    /// With `dry_run` the pending ids are logged and returned untouched.
    /// Otherwise units run in order; the first failure rolls back that unit,
    /// stops the run and is returned as [`StorageError::MigrationFailed`].
    ///
    /// # Errors
    /// Returns error if bookkeeping fails or a unit fails.
    pub fn run(&self, conn: &mut Connection, dry_run: bool) -> Result<Vec<String>> {
        let pending = self.get_pending(conn)?;
        if dry_run {
            for migration in &pending {
                tracing::info!(id = migration.id, "[dry-run] Pending migration");
            }
            return Ok(pending.iter().map(|m| m.id.to_owned()).collect());
        }

        let mut processed: Vec<String> = Vec::with_capacity(pending.len());
        for migration in &pending {
            tracing::info!(id = migration.id, "Applying migration");
            if let Err(e) = apply_one(conn, migration) {
                tracing::error!(id = migration.id, error = %e, "Migration failed");
                return Err(StorageError::MigrationFailed {
                    id: migration.id.to_owned(),
                    applied: processed,
                    source: Box::new(e),
                });
            }
            tracing::info!(id = migration.id, "Migration completed");
            processed.push(migration.id.to_owned());
        }
        if processed.is_empty() {
            tracing::info!("No pending migrations. Schema is up to date.");
        }
        Ok(processed)
    }

    /// Applied/pending state of every registered unit.
    ///
    /// # Errors
    /// Returns error if the bookkeeping table cannot be read.
    pub fn status(&self, conn: &Connection) -> Result<Vec<MigrationStatus>> {
        ensure_bookkeeping(conn)?;
        let mut stmt = conn.prepare(
            "SELECT applied_at FROM schema_migrations WHERE migration_id = ?1",
        )?;
        let mut out = Vec::with_capacity(self.migrations.len());
        for migration in &self.migrations {
            let mut rows = stmt.query(params![migration.id])?;
            let applied_at = match rows.next()? {
                Some(row) => Some(row.get::<_, String>(0)?),
                None => None,
            };
            out.push(MigrationStatus { id: migration.id.to_owned(), applied_at });
        }
        Ok(out)
    }
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn.transaction()?;
    (migration.apply)(&tx)?;
    tx.execute(
        "INSERT INTO schema_migrations (migration_id, applied_at) VALUES (?1, ?2)",
        params![migration.id, Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

fn ensure_bookkeeping(conn: &Connection) -> Result<()> {
    conn.execute_batch(BOOKKEEPING_SQL)?;
    Ok(())
}

fn applied_ids(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT migration_id FROM schema_migrations")?;
    let ids = stmt.query_map([], |row| row.get::<_, String>(0))?.collect::<rusqlite::Result<_>>()?;
    Ok(ids)
}
