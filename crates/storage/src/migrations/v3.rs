//! Migration 0003: read-compatibility views reconstructing the legacy shape.

use rusqlite::Connection;

use crate::error::Result;

pub const MIGRATION_ID: &str = "0003_legacy_compat_views";

pub(super) const SQL: &str = "
CREATE VIEW IF NOT EXISTS legacy_spectrum_sets_view AS
SELECT
    ss.spectrum_set_id,
    ss.experiment_id,
    CASE
        WHEN ss.spectrum_role = 'Result' AND ss.result_variant IS NOT NULL
            THEN 'Result_' || ss.result_variant
        ELSE COALESCE(ss.capture_label, ss.spectrum_role, 'Unknown')
    END AS type,
    ss.captured_at AS timestamp,
    CASE WHEN sd.storage_format = 'json' THEN CAST(sd.wavelengths_blob AS TEXT) ELSE NULL END AS wavelengths,
    CASE WHEN sd.storage_format = 'json' THEN CAST(sd.intensities_blob AS TEXT) ELSE NULL END AS intensities,
    sd.storage_format
FROM spectrum_sets ss
JOIN spectrum_data sd ON sd.data_id = ss.data_id;

CREATE VIEW IF NOT EXISTS legacy_analysis_runs_view AS
SELECT
    ar.analysis_run_id,
    ar.experiment_id,
    ar.analysis_type,
    ar.started_at AS timestamp,
    am.metric_key,
    am.metric_value,
    am.unit,
    ar.input_context
FROM analysis_runs ar
LEFT JOIN analysis_metrics am ON am.analysis_run_id = ar.analysis_run_id;
";

pub(super) fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(SQL)?;
    Ok(())
}
