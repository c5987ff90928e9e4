//! Human-facing role of a captured spectrum, derived from its legacy type label.

use serde::Serialize;

/// Label used when a legacy row carries no type at all.
pub const UNKNOWN_LABEL: &str = "Unknown";

const RESULT_PREFIX: &str = "Result_";
const PLAIN_ROLES: [&str; 3] = ["signal", "background", "reference"];

/// Capture label split into role and optional result variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureRole {
    pub capture_label: String,
    pub spectrum_role: String,
    pub result_variant: Option<String>,
}

impl CaptureRole {
    /// Derive the role from a legacy type label.
    ///
    /// `signal`/`background`/`reference` match case-insensitively and are
    /// capitalized; `Result_<variant>` yields role `Result`; any other label
    /// is its own role.
    #[must_use]
    pub fn derive(label: Option<&str>) -> Self {
        let capture_label = match label {
            Some(value) if !value.is_empty() => value.to_owned(),
            _ => UNKNOWN_LABEL.to_owned(),
        };
        let lowered = capture_label.to_lowercase();
        if PLAIN_ROLES.contains(&lowered.as_str()) {
            return Self { spectrum_role: capitalize(&lowered), capture_label, result_variant: None };
        }
        if let Some(variant) = capture_label.strip_prefix(RESULT_PREFIX) {
            let result_variant = (!variant.is_empty()).then(|| variant.to_owned());
            return Self { spectrum_role: "Result".to_owned(), result_variant, capture_label };
        }
        Self { spectrum_role: capture_label.clone(), capture_label, result_variant: None }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
