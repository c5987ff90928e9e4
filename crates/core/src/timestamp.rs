//! Timestamp parsing shared by backfill, cleanup and freeze audit.
//!
//! The store keeps timestamps as text in [`STORE_FORMAT`]. Older rows carry
//! ISO variants, so parsing accepts several layouts and folds zone-aware
//! inputs to naive UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::CoreError;

/// Layout of every timestamp this crate writes.
pub const STORE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: [&str; 4] =
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

/// Parse a stored or user-supplied timestamp.
///
/// Returns `None` for blank or unrecognised input.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Parse a timestamp supplied on input, failing loudly on garbage.
///
/// # Errors
/// Returns [`CoreError::InvalidTimestamp`] when no known layout matches.
pub fn require_timestamp(raw: &str) -> Result<NaiveDateTime, CoreError> {
    parse_timestamp(raw).ok_or_else(|| CoreError::InvalidTimestamp(raw.to_owned()))
}

/// Render a timestamp in [`STORE_FORMAT`].
#[must_use]
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(STORE_FORMAT).to_string()
}

/// Current UTC time in [`STORE_FORMAT`].
#[must_use]
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now().naive_utc())
}

/// Use `raw` when it is non-blank, otherwise the current time.
#[must_use]
pub fn timestamp_or_now(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_owned(),
        _ => now_timestamp(),
    }
}
