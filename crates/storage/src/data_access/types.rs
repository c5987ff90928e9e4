//! Row shapes returned by [`super::ExplorerQueries`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow {
    pub project_id: i64,
    pub name: String,
    pub status: Option<String>,
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentRow {
    pub experiment_id: i64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// One hit of [`super::ExplorerQueries::search_experiments`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentSearchRow {
    pub experiment_id: i64,
    pub project_name: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub experiment_type: Option<String>,
    /// `created_at`, falling back to the legacy `timestamp`.
    pub created_at: Option<String>,
    pub operator: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentDetail {
    pub experiment_id: i64,
    pub project_id: Option<i64>,
    pub experiment_name: Option<String>,
    pub experiment_status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub experiment_type: Option<String>,
    pub operator: Option<String>,
    pub project_name: Option<String>,
    pub project_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentOverview {
    pub experiment_id: i64,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub experiment_type: Option<String>,
    pub status: Option<String>,
    pub operator: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub timestamp: Option<String>,
    pub notes: Option<String>,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRunRow {
    pub batch_run_id: i64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRunItemRow {
    pub item_id: i64,
    pub position_label: Option<String>,
    pub status: Option<String>,
    pub experiment_id: Option<i64>,
    pub capture_count: Option<i64>,
    pub last_captured_at: Option<String>,
}

/// Batch item linked to an experiment, with its parent batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOverviewRow {
    pub item_id: i64,
    pub batch_run_id: i64,
    pub batch_name: Option<String>,
    pub batch_status: Option<String>,
    pub position_label: Option<String>,
    pub item_status: Option<String>,
    pub capture_count: Option<i64>,
    pub last_captured_at: Option<String>,
    pub metadata_json: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumSetRow {
    pub spectrum_set_id: i64,
    pub capture_label: Option<String>,
    pub spectrum_role: Option<String>,
    pub result_variant: Option<String>,
    pub captured_at: Option<String>,
    pub created_at: Option<String>,
    pub instrument_state_id: Option<i64>,
    pub processing_config_id: Option<i64>,
    pub quality_flag: Option<String>,
}

/// Capture set joined with its instrument and processing snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumDetail {
    pub spectrum_set_id: i64,
    pub capture_label: Option<String>,
    pub spectrum_role: Option<String>,
    pub result_variant: Option<String>,
    pub captured_at: Option<String>,
    pub created_at: Option<String>,
    pub quality_flag: Option<String>,
    pub instrument_state_id: Option<i64>,
    pub processing_config_id: Option<i64>,
    pub instrument_device_serial: Option<String>,
    pub instrument_integration_ms: Option<f64>,
    pub instrument_temperature: Option<f64>,
    pub processing_name: Option<String>,
    pub processing_version: Option<String>,
}

/// Decoded sample arrays behind a capture set.
///
/// Arrays are `None` when the stored format is not readable by this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumPayload {
    pub spectrum_set_id: i64,
    pub data_id: i64,
    pub points_count: i64,
    pub storage_format: String,
    pub hash: Option<String>,
    pub wavelengths: Option<Vec<f64>>,
    pub intensities: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub metric_key: String,
    pub metric_value: Option<String>,
    pub unit: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRunRow {
    pub analysis_run_id: i64,
    pub analysis_type: Option<String>,
    pub algorithm_version: Option<String>,
    pub status: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub input_context: Option<String>,
    pub metrics: Vec<MetricRow>,
}

/// Sort column for experiment search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentSort {
    #[default]
    CreatedAt,
    ExperimentId,
}

impl ExperimentSort {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::ExperimentId => "experiment_id",
        }
    }

    pub(super) const fn order_expr(&self) -> &'static str {
        match self {
            Self::CreatedAt => "COALESCE(created_at, timestamp)",
            Self::ExperimentId => "experiment_id",
        }
    }
}

impl fmt::Display for ExperimentSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentSort {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "experiment_id" => Ok(Self::ExperimentId),
            other => Err(StorageError::InvalidInput(format!("unknown sort column: {other}"))),
        }
    }
}

/// Search criteria; every unset field is unconstrained.
///
/// Dates compare on the calendar day of `created_at` (or the legacy
/// `timestamp` when that is missing). Name and operator match substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentFilter {
    pub project_id: Option<i64>,
    pub name_contains: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub experiment_type: Option<String>,
    pub status: Option<String>,
    pub operator_contains: Option<String>,
    pub sort_by: ExperimentSort,
    pub descending: bool,
    pub limit: Option<u32>,
}

impl Default for ExperimentFilter {
    fn default() -> Self {
        Self {
            project_id: None,
            name_contains: None,
            start_date: None,
            end_date: None,
            experiment_type: None,
            status: None,
            operator_contains: None,
            sort_by: ExperimentSort::default(),
            descending: true,
            limit: None,
        }
    }
}
