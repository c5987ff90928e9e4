use super::{
    create_legacy_conn, create_test_store, insert_experiment, insert_legacy_result, insert_legacy_spectrum,
};
use crate::migrations::MigrationRegistry;
use crate::validation::validate;

#[test]
fn fresh_store_validates_clean() {
    let (store, _dir) = create_test_store();
    let report = validate(store.conn()).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(report.warnings.is_empty());
    assert!(report.spectrum_samples.is_empty());
}

#[test]
fn migrated_legacy_rows_read_back_through_views() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1, 2]", "[3, 4]");
    insert_legacy_result(&conn, experiment_id, "Peak", "2024-03-01 10:00:00", r#"{"peak": 1}"#);
    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    let report = validate(&conn).unwrap();

    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(report.warnings.is_empty());
    assert_eq!(report.spectrum_samples.len(), 1);
    assert_eq!(report.spectrum_samples[0].kind.as_deref(), Some("Signal"));
    assert_eq!(report.spectrum_samples[0].experiment_id, Some(experiment_id));
    assert_eq!(report.analysis_samples.len(), 1);
    assert_eq!(report.analysis_samples[0].kind.as_deref(), Some("Peak"));
}

#[test]
fn flagged_spectra_surface_as_count_warning() {
    let (mut conn, _dir) = create_legacy_conn();
    let experiment_id = insert_experiment(&conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_spectrum(&conn, experiment_id, "Signal", "[1, 2", "[3, 4]");
    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    let report = validate(&conn).unwrap();

    assert!(report.is_ok());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("has 0 rows but spectra has 1"));
}

#[test]
fn unlinked_analysis_rows_are_errors() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2024-03-01 09:00:00");
    insert_legacy_result(conn, experiment_id, "Peak", "2024-03-01 10:00:00", "{}");

    let report = validate(conn).unwrap();

    assert!(!report.is_ok());
    assert_eq!(report.errors, vec!["1 analysis_results rows are not linked to analysis_runs".to_owned()]);
}

#[test]
fn unmigrated_store_lists_missing_objects() {
    let (conn, _dir) = create_legacy_conn();

    let report = validate(&conn).unwrap();

    assert!(report.errors.iter().any(|e| e.starts_with("missing tables: analysis_metrics, analysis_runs")));
    assert!(report.errors.iter().any(|e| e.starts_with("missing views: ")));
    assert!(report.errors.contains(&"spectra is missing columns: data_id, quality_flag, spectrum_set_id".to_owned()));
    assert!(report.errors.contains(&"analysis_results is missing columns: analysis_run_id".to_owned()));
    assert_eq!(report.warnings.len(), 2);
}
