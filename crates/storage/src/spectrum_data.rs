//! Immutable numeric payload records (`spectrum_data`).
//!
//! Samples are stored as compact JSON arrays of floats; the row hash covers
//! both arrays so identical payloads are recognisable.

use nanosense_core::snapshot::sha256_hex;
use rusqlite::{Connection, params};

use crate::error::Result;

/// Storage format written by this crate.
pub const JSON_FORMAT: &str = "json";

/// Encoded payload ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSpectrum {
    pub wavelengths: Vec<u8>,
    pub intensities: Vec<u8>,
    pub points_count: usize,
    pub hash: String,
}

/// Encode both sample arrays. Callers guarantee equal lengths.
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode(wavelengths: &[f64], intensities: &[f64]) -> Result<EncodedSpectrum> {
    let points_count = wavelengths.len();
    let wavelengths = serde_json::to_vec(wavelengths)?;
    let intensities = serde_json::to_vec(intensities)?;
    let mut hashed = Vec::with_capacity(wavelengths.len() + intensities.len() + 1);
    hashed.extend_from_slice(&wavelengths);
    hashed.push(b'|');
    hashed.extend_from_slice(&intensities);
    Ok(EncodedSpectrum { hash: sha256_hex(&hashed), wavelengths, intensities, points_count })
}

/// Insert a payload record and return its `data_id`.
///
/// # Errors
/// Returns error if encoding or the insert fails.
pub fn insert(
    conn: &Connection,
    wavelengths: &[f64],
    intensities: &[f64],
    created_at: &str,
) -> Result<i64> {
    let encoded = encode(wavelengths, intensities)?;
    conn.execute(
        "INSERT INTO spectrum_data (wavelengths_blob, intensities_blob, points_count, hash, storage_format, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            encoded.wavelengths,
            encoded.intensities,
            i64::try_from(encoded.points_count).unwrap_or(i64::MAX),
            encoded.hash,
            JSON_FORMAT,
            created_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Decode a stored sample blob. Only the JSON format is readable here.
#[must_use]
pub fn decode(blob: &[u8], storage_format: &str) -> Option<Vec<f64>> {
    if storage_format != JSON_FORMAT {
        return None;
    }
    serde_json::from_slice(blob).ok()
}
