//! Owned single-writer connection to a NanoSense store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nanosense_core::constants::BUSY_TIMEOUT_MS;
use rusqlite::Connection;

use crate::data_access::ExplorerQueries;
use crate::error::{Result, StorageError};
use crate::legacy_schema::ensure_legacy_schema;
use crate::migrations::{MigrationRegistry, MigrationStatus};

/// One SQLite connection plus the file it came from.
///
/// Every routine in this crate runs synchronously on this connection; callers
/// must not open a second writer against the same file concurrently.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

fn init_connection(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    Ok(())
}

impl Store {
    /// Open (or create) the store at `path` and bring it up to date: legacy
    /// base schema first, then every built-in migration.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or a migration fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut store = Self::connect(path)?;
        store.bootstrap()?;
        Ok(store)
    }

    /// Open an existing store without changing its schema.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidInput`] when the file does not exist.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(StorageError::InvalidInput(format!("database file not found: {}", path.display())));
        }
        Self::connect(path)
    }

    /// Bootstrapped in-memory store.
    ///
    /// # Errors
    /// Returns error if a migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_connection(&conn)?;
        let mut store = Self { conn, path: None };
        store.bootstrap()?;
        Ok(store)
    }

    fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_connection(&conn)?;
        tracing::debug!(path = %path.display(), "Store opened");
        Ok(Self { conn, path: Some(path.to_path_buf()) })
    }

    /// Create the legacy base tables if missing, then apply pending
    /// built-in migrations. Returns the ids applied by this call.
    ///
    /// # Errors
    /// Returns error if DDL or a migration fails.
    pub fn bootstrap(&mut self) -> Result<Vec<String>> {
        ensure_legacy_schema(&self.conn)?;
        MigrationRegistry::builtin().run(&mut self.conn, false)
    }

    /// Run the built-in migrations.
    ///
    /// # Errors
    /// Returns error if a migration fails.
    pub fn migrate(&mut self, dry_run: bool) -> Result<Vec<String>> {
        MigrationRegistry::builtin().run(&mut self.conn, dry_run)
    }

    /// Applied state of the built-in migrations.
    ///
    /// # Errors
    /// Returns error if the bookkeeping table cannot be read.
    pub fn migration_status(&self) -> Result<Vec<MigrationStatus>> {
        MigrationRegistry::builtin().status(&self.conn)
    }

    #[must_use]
    pub fn queries(&self) -> ExplorerQueries<'_> {
        ExplorerQueries::new(&self.conn)
    }

    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Backing file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
