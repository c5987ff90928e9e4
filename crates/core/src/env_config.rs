//! Environment overrides for governance defaults.

use crate::constants::{
    DEFAULT_CLEANUP_AGE_DAYS, DEFAULT_TOP_DUPLICATES, ENV_CLEANUP_AGE_DAYS, ENV_TOP_DUPLICATES,
};

/// Parse an environment variable with a default fallback.
///
/// - Unset: returns `default` silently.
/// - Set but unparsable: logs a warning and returns `default`.
pub fn env_parse_with_default<T: std::str::FromStr + std::fmt::Display>(
    var: &str,
    default: T,
) -> T {
    match std::env::var(var) {
        Ok(v) => match v.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(
                    var,
                    value = %v,
                    default = %default,
                    "invalid env var value, using default"
                );
                default
            },
        },
        Err(_) => default,
    }
}

/// Cleanup age in days, honouring `NANOSENSE_CLEANUP_AGE_DAYS`.
#[must_use]
pub fn cleanup_age_days() -> i64 {
    env_parse_with_default(ENV_CLEANUP_AGE_DAYS, DEFAULT_CLEANUP_AGE_DAYS)
}

/// Duplicate buckets listed per table, honouring `NANOSENSE_TOP_DUPLICATES`.
#[must_use]
pub fn top_duplicates() -> usize {
    env_parse_with_default(ENV_TOP_DUPLICATES, DEFAULT_TOP_DUPLICATES)
}
