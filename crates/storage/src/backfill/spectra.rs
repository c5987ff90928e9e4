//! Legacy `spectra` rows to `spectrum_data` + `spectrum_sets`.

use nanosense_core::timestamp::timestamp_or_now;
use nanosense_core::{CaptureRole, ConfigValue, QualityFlag};
use rusqlite::{Connection, params};

use super::{RowTally, experiment_exists, first_non_blank};
use super::defaults::{ensure_default_instrument_state, ensure_default_processing_snapshot};
use crate::error::Result;
use crate::spectrum_data;
use crate::sql_value::{int_at, text_at};

struct LegacySpectrum {
    spectrum_id: i64,
    experiment_id: Option<i64>,
    label: Option<String>,
    timestamp: Option<String>,
    wavelengths: Option<String>,
    intensities: Option<String>,
    data_id: Option<i64>,
    spectrum_set_id: Option<i64>,
    created_at: Option<String>,
}

/// Decode a legacy JSON sample array.
///
/// Blank payloads decode to an empty array.
///
/// # Errors
/// [`QualityFlag::InvalidJson`] when the text is not a JSON list,
/// [`QualityFlag::NonNumeric`] when an element is not a finite number.
pub fn parse_numeric_array(payload: Option<&str>) -> std::result::Result<Vec<f64>, QualityFlag> {
    let Some(raw) = payload.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };
    let Ok(ConfigValue::List(items)) = ConfigValue::parse(raw) else {
        return Err(QualityFlag::InvalidJson);
    };
    items
        .iter()
        .map(|item| item.as_f64().filter(|v| v.is_finite()).ok_or(QualityFlag::NonNumeric))
        .collect()
}

fn load_pending(conn: &Connection) -> Result<Vec<LegacySpectrum>> {
    let mut stmt = conn.prepare(
        "SELECT spectrum_id, experiment_id, type, timestamp, wavelengths, intensities,
                data_id, spectrum_set_id, created_at
         FROM spectra
         WHERE data_id IS NULL OR spectrum_set_id IS NULL
         ORDER BY spectrum_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LegacySpectrum {
                spectrum_id: row.get(0)?,
                experiment_id: int_at(row, 1)?,
                label: text_at(row, 2)?,
                timestamp: text_at(row, 3)?,
                wavelengths: text_at(row, 4)?,
                intensities: text_at(row, 5)?,
                data_id: int_at(row, 6)?,
                spectrum_set_id: int_at(row, 7)?,
                created_at: text_at(row, 8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn flag_row(conn: &Connection, spectrum_id: i64, flag: QualityFlag, created_at: &str) -> Result<()> {
    conn.execute(
        "UPDATE spectra SET quality_flag = ?1, created_at = COALESCE(created_at, ?2) WHERE spectrum_id = ?3",
        params![flag.as_str(), created_at, spectrum_id],
    )?;
    Ok(())
}

pub(super) fn migrate(conn: &Connection) -> Result<RowTally> {
    let pending = load_pending(conn)?;
    let mut tally = RowTally::default();
    if pending.is_empty() {
        return Ok(tally);
    }

    let processing_id = ensure_default_processing_snapshot(conn)?;
    let instrument_id = ensure_default_instrument_state(conn)?;

    for row in pending {
        let created_at =
            timestamp_or_now(first_non_blank(&[row.created_at.as_deref(), row.timestamp.as_deref()]));

        if !experiment_exists(conn, row.experiment_id)? {
            tracing::warn!(spectrum_id = row.spectrum_id, "Spectrum references missing experiment");
            flag_row(conn, row.spectrum_id, QualityFlag::MissingExperiment, &created_at)?;
            tally.skipped += 1;
            continue;
        }

        let mut flag = QualityFlag::Good;
        let data_id = match row.data_id {
            Some(id) => id,
            None => {
                let decoded = parse_numeric_array(row.wavelengths.as_deref()).and_then(|w| {
                    parse_numeric_array(row.intensities.as_deref()).map(|i| (w, i))
                });
                let (mut wavelengths, mut intensities) = match decoded {
                    Ok(pair) => pair,
                    Err(defect) => {
                        tracing::warn!(spectrum_id = row.spectrum_id, flag = defect.as_str(), "Unreadable spectrum payload");
                        flag_row(conn, row.spectrum_id, defect, &created_at)?;
                        tally.skipped += 1;
                        continue;
                    },
                };
                if wavelengths.len() != intensities.len() {
                    let common = wavelengths.len().min(intensities.len());
                    tracing::warn!(
                        spectrum_id = row.spectrum_id,
                        wavelengths = wavelengths.len(),
                        intensities = intensities.len(),
                        "Spectrum arrays differ in length; truncating"
                    );
                    wavelengths.truncate(common);
                    intensities.truncate(common);
                    flag = QualityFlag::LengthMismatch;
                }
                spectrum_data::insert(conn, &wavelengths, &intensities, &created_at)?
            },
        };

        let spectrum_set_id = match row.spectrum_set_id {
            Some(id) => id,
            None => {
                let role = CaptureRole::derive(row.label.as_deref());
                conn.execute(
                    "INSERT INTO spectrum_sets (
                        experiment_id, batch_run_item_id, capture_label, spectrum_role, result_variant,
                        data_id, instrument_state_id, processing_config_id, captured_at, created_at, quality_flag
                     ) VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        row.experiment_id,
                        role.capture_label,
                        role.spectrum_role,
                        role.result_variant,
                        data_id,
                        instrument_id,
                        processing_id,
                        timestamp_or_now(row.timestamp.as_deref()),
                        created_at,
                        flag.as_str()
                    ],
                )?;
                conn.last_insert_rowid()
            },
        };

        conn.execute(
            "UPDATE spectra
             SET spectrum_set_id = ?1, data_id = ?2, quality_flag = ?3, created_at = COALESCE(created_at, ?4)
             WHERE spectrum_id = ?5",
            params![spectrum_set_id, data_id, flag.as_str(), created_at, row.spectrum_id],
        )?;
        tally.migrated += 1;
    }

    tracing::info!(migrated = tally.migrated, skipped = tally.skipped, "Spectra backfill completed");
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_payload_is_empty() {
        assert_eq!(parse_numeric_array(None), Ok(Vec::new()));
        assert_eq!(parse_numeric_array(Some("  ")), Ok(Vec::new()));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        assert_eq!(parse_numeric_array(Some(r#"[1, "2.5", true]"#)), Ok(vec![1.0, 2.5, 1.0]));
    }

    #[test]
    fn defects_map_to_flags() {
        assert_eq!(parse_numeric_array(Some("[1, 2")), Err(QualityFlag::InvalidJson));
        assert_eq!(parse_numeric_array(Some(r#"{"a": 1}"#)), Err(QualityFlag::InvalidJson));
        assert_eq!(parse_numeric_array(Some(r#"[1, "x"]"#)), Err(QualityFlag::NonNumeric));
        assert_eq!(parse_numeric_array(Some("[1, null]")), Err(QualityFlag::NonNumeric));
        assert_eq!(parse_numeric_array(Some(r#"["nan", 3]"#)), Err(QualityFlag::NonNumeric));
        assert_eq!(parse_numeric_array(Some(r#"[1, "-inf"]"#)), Err(QualityFlag::NonNumeric));
    }
}
