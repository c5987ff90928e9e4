//! Typed error enum for the storage layer.
//!
//! Only fatal conditions surface here. Malformed legacy rows are recorded as
//! quality flags and governance findings are returned as warnings.

use thiserror::Error;

/// Storage-layer error with variants covering every expected failure mode.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// SQL / connection failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A migration unit failed; its transaction was rolled back.
    ///
    /// `applied` lists the ids committed earlier in the same run.
    #[error("migration {id} failed: {source}")]
    MigrationFailed {
        id: String,
        applied: Vec<String>,
        #[source]
        source: Box<StorageError>,
    },

    /// Registry misuse (duplicate or malformed id).
    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    /// Caller-supplied argument rejected before touching the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Core(#[from] nanosense_core::CoreError),
}

impl StorageError {
    /// Whether this error is a SQLite constraint violation (unique, not-null, check).
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Sqlite(err) => is_constraint_violation(err),
            _ => false,
        }
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub type Result<T> = std::result::Result<T, StorageError>;
