//! Snapshot governance: duplicate analysis, reference-safe cleanup, reports
//! and the legacy freeze audit.
//!
//! Snapshot rows are shared configuration records. Governance never deletes
//! them; cleanup only flips `is_active` on rows nothing points at.

mod analyze;
mod cleanup;
mod freeze;
mod references;
mod report;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use analyze::{DuplicateBucket, SnapshotAnalysis, TableAnalysis, analyze, analyze_table};
pub use cleanup::{
    CleanupCandidate, CleanupPolicy, CleanupReport, CleanupStatus, Cutoff, TableCleanup, cleanup,
    format_candidates,
};
pub use freeze::{
    FreezeAuditOptions, FreezeAuditReport, FreezeBackfill, LegacyTableStats, audit_legacy_tables,
    backup_database, export_legacy_csv, freeze_warnings, render_freeze_report, run_freeze_audit,
};
pub use references::reference_counts;
pub use report::{
    ReportFiles, render_governance_summary, render_markdown_report, write_csv_reports, write_reports,
};

/// The two deduplicated snapshot tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SnapshotTable {
    InstrumentStates,
    ProcessingSnapshots,
}

impl SnapshotTable {
    pub const ALL_VARIANTS: &'static [SnapshotTable] =
        &[SnapshotTable::InstrumentStates, SnapshotTable::ProcessingSnapshots];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InstrumentStates => "instrument_states",
            Self::ProcessingSnapshots => "processing_snapshots",
        }
    }

    #[must_use]
    pub const fn id_column(&self) -> &'static str {
        match self {
            Self::InstrumentStates => "instrument_state_id",
            Self::ProcessingSnapshots => "processing_config_id",
        }
    }

    /// Column used for age and time-range decisions.
    #[must_use]
    pub const fn timestamp_column(&self) -> &'static str {
        match self {
            Self::InstrumentStates => "captured_at",
            Self::ProcessingSnapshots => "created_at",
        }
    }

    /// `(table, column)` pairs that hold references to this table's ids.
    #[must_use]
    pub const fn referencing_columns(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::InstrumentStates => &[("spectrum_sets", "instrument_state_id")],
            Self::ProcessingSnapshots => {
                &[("spectrum_sets", "processing_config_id"), ("experiments", "processing_config_id")]
            },
        }
    }

    /// Section heading used in Markdown reports.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::InstrumentStates => "Instrument States (instrument_states)",
            Self::ProcessingSnapshots => "Processing Snapshots (processing_snapshots)",
        }
    }
}

impl fmt::Display for SnapshotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotTable {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instrument_states" => Ok(Self::InstrumentStates),
            "processing_snapshots" => Ok(Self::ProcessingSnapshots),
            other => Err(StorageError::Core(nanosense_core::CoreError::InvalidSnapshotTable(other.to_owned()))),
        }
    }
}
