//! Provenance and defect markers attached to migrated rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Outcome recorded on a legacy row or capture set by the backfill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum QualityFlag {
    /// Migrated without loss
    Good,
    /// Parent experiment row does not exist
    MissingExperiment,
    /// Wavelength and intensity counts differ; truncated to the shorter
    LengthMismatch,
    /// Payload is not a decodable JSON list
    InvalidJson,
    /// Payload list holds a non-numeric element
    NonNumeric,
    /// Analysis run could not be inserted after every retry
    RunCollision,
}

impl QualityFlag {
    pub const ALL_VARIANTS: &'static [QualityFlag] = &[
        QualityFlag::Good,
        QualityFlag::MissingExperiment,
        QualityFlag::LengthMismatch,
        QualityFlag::InvalidJson,
        QualityFlag::NonNumeric,
        QualityFlag::RunCollision,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Good => "good",
            Self::MissingExperiment => "missing_experiment",
            Self::LengthMismatch => "length_mismatch",
            Self::InvalidJson => "invalid_json",
            Self::NonNumeric => "non_numeric",
            Self::RunCollision => "run_collision",
        }
    }

    /// Whether the row still produced normalized records.
    #[must_use]
    pub const fn is_migrated(&self) -> bool {
        matches!(*self, Self::Good | Self::LengthMismatch)
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityFlag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_VARIANTS
            .iter()
            .copied()
            .find(|flag| flag.as_str() == s.trim())
            .ok_or_else(|| CoreError::InvalidQualityFlag(s.to_owned()))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test code")]
mod tests {
    use super::*;

    #[test]
    fn text_form_parses_back() {
        for flag in QualityFlag::ALL_VARIANTS {
            assert_eq!(flag.as_str().parse::<QualityFlag>().unwrap(), *flag);
        }
        assert!("bogus".parse::<QualityFlag>().is_err());
    }

    #[test]
    fn only_good_and_truncated_rows_count_as_migrated() {
        assert!(QualityFlag::Good.is_migrated());
        assert!(QualityFlag::LengthMismatch.is_migrated());
        assert!(!QualityFlag::InvalidJson.is_migrated());
        assert!(!QualityFlag::MissingExperiment.is_migrated());
    }
}
