use super::{
    create_legacy_conn, create_test_store, insert_experiment, insert_legacy_result, insert_legacy_spectrum,
    query_i64, query_text,
};
use crate::backfill::{self, DEFAULT_INSTRUMENT_SERIAL, DEFAULT_PROCESSING_NAME};
use crate::migrations::MigrationRegistry;

#[test]
fn legacy_spectrum_migrates_end_to_end() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    assert_eq!(experiment_id, 1);
    insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1, 2, 3]", "[10, 20, 30]");

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM spectrum_data"), 1);
    assert_eq!(query_i64(&conn, "SELECT points_count FROM spectrum_data"), 3);
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM spectrum_sets"), 1);
    assert_eq!(query_text(&conn, "SELECT quality_flag FROM spectrum_sets").as_deref(), Some("good"));
    assert_eq!(query_text(&conn, "SELECT spectrum_role FROM spectrum_sets").as_deref(), Some("Signal"));

    let (set_id, data_id): (i64, i64) =
        conn.query_row("SELECT spectrum_set_id, data_id FROM spectrum_sets", [], |r| Ok((r.get(0)?, r.get(1)?))).unwrap();
    let (ptr_set, ptr_data, flag): (i64, i64, String) = conn
        .query_row("SELECT spectrum_set_id, data_id, quality_flag FROM spectra", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .unwrap();
    assert_eq!((ptr_set, ptr_data), (set_id, data_id));
    assert_eq!(flag, "good");
    assert_eq!(
        query_text(&conn, "SELECT CAST(wavelengths_blob AS TEXT) FROM spectrum_data").as_deref(),
        Some("[1.0,2.0,3.0]")
    );
}

#[test]
fn mismatched_lengths_truncate_and_flag() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1, 2, 3, 4, 5]", "[10, 20, 30]");

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    assert_eq!(query_text(&conn, "SELECT quality_flag FROM spectra").as_deref(), Some("length_mismatch"));
    assert_eq!(query_text(&conn, "SELECT quality_flag FROM spectrum_sets").as_deref(), Some("length_mismatch"));
    assert_eq!(query_i64(&conn, "SELECT points_count FROM spectrum_data"), 3);
}

#[test]
fn defective_rows_are_flagged_not_migrated() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    let orphan = insert_legacy_spectrum(&conn, 99, "Signal", "[1]", "[2]");
    let broken = insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1, 2", "[2]");
    let words = insert_legacy_spectrum(&conn, experiment_id, "Signal", r#"["a"]"#, "[2]");
    let good = insert_legacy_spectrum(&conn, experiment_id, "Background", "[1]", "[2]");

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    let flag = |id: i64| query_text(&conn, &format!("SELECT quality_flag FROM spectra WHERE spectrum_id = {id}"));
    assert_eq!(flag(orphan).as_deref(), Some("missing_experiment"));
    assert_eq!(flag(broken).as_deref(), Some("invalid_json"));
    assert_eq!(flag(words).as_deref(), Some("non_numeric"));
    assert_eq!(flag(good).as_deref(), Some("good"));

    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM spectrum_sets"), 1);
    // every legacy row ends up with a pointer or an explanatory flag
    assert_eq!(
        query_i64(&conn, "SELECT COUNT(*) FROM spectra WHERE spectrum_set_id IS NULL AND quality_flag = 'good'"),
        0
    );
}

#[test]
fn default_snapshots_are_created_once_and_shared() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1]", "[2]");
    insert_legacy_spectrum(&conn, experiment_id, "Reference", "[3]", "[4]");

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    assert_eq!(
        query_i64(
            &conn,
            &format!("SELECT COUNT(*) FROM instrument_states WHERE device_serial = '{DEFAULT_INSTRUMENT_SERIAL}'")
        ),
        1
    );
    assert_eq!(
        query_i64(&conn, &format!("SELECT COUNT(*) FROM processing_snapshots WHERE name = '{DEFAULT_PROCESSING_NAME}'")),
        1
    );
    assert_eq!(query_i64(&conn, "SELECT COUNT(DISTINCT instrument_state_id) FROM spectrum_sets"), 1);
    assert_eq!(query_i64(&conn, "SELECT COUNT(DISTINCT processing_config_id) FROM spectrum_sets"), 1);
}

#[test]
fn no_defaults_without_pending_spectra() {
    let (store, _dir) = create_test_store();
    assert_eq!(query_i64(store.conn(), "SELECT COUNT(*) FROM instrument_states"), 0);
    assert_eq!(query_i64(store.conn(), "SELECT COUNT(*) FROM processing_snapshots"), 0);
}

#[test]
fn rerunning_the_data_phase_changes_nothing() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1, 2]", "[3, 4]");
    insert_legacy_result(&conn, experiment_id, "Peak", "2024-03-01 10:00:00", r#"{"peak": 1}"#);
    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    let report = backfill::run(&conn).unwrap();
    assert_eq!(report.spectra.migrated, 0);
    assert_eq!(report.analysis_results.migrated, 0);
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM spectrum_sets"), 1);
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM analysis_runs"), 1);
}

#[test]
fn existing_data_record_is_reused() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2024-03-01 09:00:00");
    conn.execute(
        "INSERT INTO spectrum_data (wavelengths_blob, intensities_blob, points_count, storage_format)
         VALUES ('[1.0]', '[2.0]', 1, 'json')",
        [],
    )
    .unwrap();
    let data_id = conn.last_insert_rowid();
    let spectrum_id = insert_legacy_spectrum(conn, experiment_id, "Signal", "[9, 9]", "[9, 9]");
    conn.execute("UPDATE spectra SET data_id = ?1 WHERE spectrum_id = ?2", [data_id, spectrum_id]).unwrap();

    let report = backfill::run(conn).unwrap();

    assert_eq!(report.spectra.migrated, 1);
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM spectrum_data"), 1);
    assert_eq!(query_i64(conn, "SELECT data_id FROM spectrum_sets"), data_id);
}

#[test]
fn analysis_results_become_runs_with_metrics() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    let result_id =
        insert_legacy_result(&conn, experiment_id, "Affinity_KD", "2024-03-01 10:00:00", r#"{"KD": 4.2, "Bmax": 7}"#);

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    let run_id = query_i64(&conn, &format!("SELECT analysis_run_id FROM analysis_results WHERE result_id = {result_id}"));
    assert_eq!(query_text(&conn, "SELECT algorithm_version FROM analysis_runs").as_deref(), Some("legacy"));
    assert_eq!(query_text(&conn, "SELECT status FROM analysis_runs").as_deref(), Some("completed"));
    assert_eq!(query_text(&conn, "SELECT started_at FROM analysis_runs").as_deref(), Some("2024-03-01 10:00:00"));

    let metrics: Vec<(String, Option<String>, i64)> = conn
        .prepare("SELECT metric_key, unit, is_primary FROM analysis_metrics WHERE analysis_run_id = ?1 ORDER BY rowid")
        .unwrap()
        .query_map([run_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(
        metrics,
        vec![("KD".to_owned(), Some("nM".to_owned()), 1), ("Bmax".to_owned(), None, 0)]
    );
    assert_eq!(query_text(&conn, "SELECT quality_flag FROM analysis_results").as_deref(), Some("good"));
}

#[test]
fn colliding_runs_get_a_sequence_number() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_result(&conn, experiment_id, "Peak", "2024-03-01 10:00:00", "[1]");
    insert_legacy_result(&conn, experiment_id, "Peak", "2024-03-01 10:00:00", "[2]");

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM analysis_runs"), 2);
    assert_eq!(query_i64(&conn, "SELECT MAX(run_seq) FROM analysis_runs"), 1);
    assert_eq!(query_i64(&conn, "SELECT COUNT(DISTINCT started_at) FROM analysis_runs"), 1);
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM analysis_results WHERE analysis_run_id IS NULL"), 0);
}

#[test]
fn exhausted_retries_flag_run_collision() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2024-03-01 09:00:00");
    for seq in 0..5 {
        conn.execute(
            "INSERT INTO analysis_runs (experiment_id, analysis_type, started_at, run_seq)
             VALUES (?1, 'Peak', '2024-03-01 10:00:00', ?2)",
            [experiment_id, seq],
        )
        .unwrap();
    }
    insert_legacy_result(conn, experiment_id, "Peak", "2024-03-01 10:00:00", "[1]");

    let report = backfill::run(conn).unwrap();

    assert_eq!(report.analysis_results.skipped, 1);
    assert_eq!(query_text(conn, "SELECT quality_flag FROM analysis_results").as_deref(), Some("run_collision"));
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM analysis_runs"), 5);
}

/// `analysis_runs` as created by stores predating the `run_seq` key.
const NARROW_ANALYSIS_RUNS: &str = "CREATE TABLE analysis_runs (
    analysis_run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER REFERENCES experiments(experiment_id) ON DELETE CASCADE,
    batch_run_item_id INTEGER REFERENCES batch_run_items(item_id) ON DELETE SET NULL,
    analysis_type TEXT NOT NULL,
    algorithm_version TEXT,
    status TEXT NOT NULL DEFAULT 'completed',
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    initiated_by INTEGER REFERENCES users(user_id),
    input_context TEXT,
    UNIQUE (experiment_id, analysis_type, started_at)
)";

#[test]
fn narrow_run_key_with_added_sequence_column_suffixes_started_at() {
    let (mut conn, _dir) = create_legacy_conn();
    conn.execute_batch(NARROW_ANALYSIS_RUNS).unwrap();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_result(&conn, experiment_id, "Peak", "2024-03-01 10:00:00", "[1]");
    let second = insert_legacy_result(&conn, experiment_id, "Peak", "2024-03-01 10:00:00", "[2]");

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM analysis_runs"), 2);
    assert_eq!(query_i64(&conn, "SELECT MAX(run_seq) FROM analysis_runs"), 0);
    assert_eq!(
        query_text(&conn, "SELECT MAX(started_at) FROM analysis_runs").as_deref(),
        Some(format!("2024-03-01 10:00:00+{second}-1").as_str())
    );
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM analysis_results WHERE quality_flag = 'good'"), 2);
}

#[test]
fn run_table_without_sequence_column_suffixes_started_at() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    conn.execute_batch(&format!("DROP TABLE analysis_runs; {NARROW_ANALYSIS_RUNS};")).unwrap();
    let experiment_id = insert_experiment(conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_result(conn, experiment_id, "Peak", "2024-03-01 10:00:00", "[1]");
    let second = insert_legacy_result(conn, experiment_id, "Peak", "2024-03-01 10:00:00", "[2]");

    let report = backfill::run(conn).unwrap();

    assert_eq!((report.analysis_results.migrated, report.analysis_results.skipped), (2, 0));
    assert_eq!(
        query_text(conn, "SELECT MAX(started_at) FROM analysis_runs").as_deref(),
        Some(format!("2024-03-01 10:00:00+{second}-1").as_str())
    );
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM analysis_results WHERE analysis_run_id IS NULL"), 0);
}

#[test]
fn non_finite_samples_are_flagged_non_numeric() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1, 2]", r#"["nan", 3]"#);

    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    assert_eq!(query_text(&conn, "SELECT quality_flag FROM spectra").as_deref(), Some("non_numeric"));
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM spectrum_data"), 0);
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM spectra WHERE spectrum_set_id IS NOT NULL"), 0);
}

#[test]
fn orphan_analysis_result_is_flagged() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    insert_legacy_result(conn, 42, "Peak", "2024-03-01 10:00:00", "[1]");

    let report = backfill::run(conn).unwrap();

    assert_eq!(report.analysis_results.skipped, 1);
    assert_eq!(query_text(conn, "SELECT quality_flag FROM analysis_results").as_deref(), Some("missing_experiment"));
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM analysis_runs"), 0);
}
