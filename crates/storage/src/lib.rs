//! Storage layer for nanosense
//!
//! SQLite schema evolution for the NanoSense spectral store: a migration
//! registry and runner, the legacy-to-normalized backfill, the live capture
//! writer, read-only explorer queries and snapshot governance.

pub mod backfill;
pub mod capture;
pub mod catalog;
pub mod data_access;
mod error;
pub mod governance;
pub mod legacy_schema;
pub mod migrations;
pub mod spectrum_data;
pub mod sql_value;
mod store;
#[cfg(test)]
mod tests;
pub mod validation;

pub use backfill::{BackfillReport, RowTally};
pub use capture::{CaptureIds, NewCapture, record_capture};
pub use data_access::ExplorerQueries;
pub use error::{Result, StorageError};
pub use governance::SnapshotTable;
pub use migrations::{Migration, MigrationFn, MigrationRegistry, MigrationStatus};
pub use store::Store;
pub use validation::{ValidationReport, validate};
