use std::result::Result as StdResult;

use thiserror::Error;

/// Errors raised by domain parsing in nanosense-core
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid quality flag: {0}")]
    InvalidQualityFlag(String),

    #[error("Invalid snapshot table: {0}")]
    InvalidSnapshotTable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = StdResult<T, CoreError>;
