use nanosense_core::ConfigValue;

use super::{create_test_store, insert_experiment, query_i64, query_text};
use crate::capture::{NewCapture, record_capture, resolve_instrument_state, resolve_processing_snapshot};
use crate::error::StorageError;

fn instrument(serial: &str, gain: i64) -> ConfigValue {
    ConfigValue::map([
        ("device_serial", ConfigValue::from(serial)),
        ("integration_time_ms", ConfigValue::Float(100.0)),
        ("gain", ConfigValue::Int(gain)),
        ("unused", ConfigValue::Null),
    ])
}

fn capture(experiment_id: i64, gain: i64) -> NewCapture {
    NewCapture {
        experiment_id,
        label: Some("Result_Absorbance".to_owned()),
        captured_at: Some("2024-05-01 12:00:00".to_owned()),
        wavelengths: vec![400.0, 401.0],
        intensities: vec![0.5, 0.6],
        instrument: Some(instrument("SN-1", gain)),
        processing: Some(ConfigValue::map([
            ("name", ConfigValue::from("smooth")),
            ("version", ConfigValue::from("2")),
            ("window", ConfigValue::Int(5)),
        ])),
        ..NewCapture::default()
    }
}

#[test]
fn recurring_configuration_is_stored_once() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2024-05-01 11:00:00");

    let first = record_capture(conn, &capture(experiment_id, 2)).unwrap();
    let second = record_capture(conn, &capture(experiment_id, 2)).unwrap();
    let third = record_capture(conn, &capture(experiment_id, 3)).unwrap();

    assert_eq!(first.instrument_state_id, second.instrument_state_id);
    assert_ne!(first.instrument_state_id, third.instrument_state_id);
    assert_eq!(first.processing_config_id, third.processing_config_id);
    assert_ne!(first.data_id, second.data_id);
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM instrument_states"), 2);
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM processing_snapshots"), 1);
}

#[test]
fn field_order_and_nulls_do_not_matter() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let a = resolve_instrument_state(conn, &instrument("SN-9", 1)).unwrap();
    let reordered = ConfigValue::map([
        ("gain", ConfigValue::Int(1)),
        ("integration_time_ms", ConfigValue::Float(100.0)),
        ("device_serial", ConfigValue::from("SN-9")),
    ]);
    assert_eq!(resolve_instrument_state(conn, &reordered).unwrap(), a);
}

#[test]
fn deactivated_snapshots_are_not_reused() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let info = ConfigValue::map([("name", ConfigValue::from("baseline")), ("order", ConfigValue::Int(2))]);
    let first = resolve_processing_snapshot(conn, &info).unwrap();
    conn.execute("UPDATE processing_snapshots SET is_active = 0 WHERE processing_config_id = ?1", [first]).unwrap();

    let second = resolve_processing_snapshot(conn, &info).unwrap();

    assert_ne!(first, second);
    assert_eq!(query_text(conn, &format!("SELECT version FROM processing_snapshots WHERE processing_config_id = {second}")).as_deref(), Some("1.0"));
    assert_eq!(
        query_text(conn, &format!("SELECT parameters_json FROM processing_snapshots WHERE processing_config_id = {second}"))
            .as_deref(),
        Some(r#"{"order": 2}"#)
    );
}

#[test]
fn numeric_versions_are_kept_apart() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let smooth = |version: i64| {
        ConfigValue::map([
            ("name", ConfigValue::from("smooth")),
            ("version", ConfigValue::Int(version)),
            ("window", ConfigValue::Int(5)),
        ])
    };

    let v2 = resolve_processing_snapshot(conn, &smooth(2)).unwrap();
    let v3 = resolve_processing_snapshot(conn, &smooth(3)).unwrap();

    assert_ne!(v2, v3);
    assert_eq!(resolve_processing_snapshot(conn, &smooth(2)).unwrap(), v2);
    assert_eq!(
        query_text(conn, &format!("SELECT version FROM processing_snapshots WHERE processing_config_id = {v2}")).as_deref(),
        Some("2")
    );
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM processing_snapshots WHERE version = '1.0'"), 0);
}

#[test]
fn explicit_config_entry_matches_stored_state() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    conn.execute(
        r#"INSERT INTO instrument_states (device_serial, config_json, captured_at)
           VALUES ('SN', '{"config": {"gain": 3}, "device_serial": "SN"}', '2024-01-01 00:00:00')"#,
        [],
    )
    .unwrap();
    let stored = conn.last_insert_rowid();

    let nested = ConfigValue::map([
        ("device_serial", ConfigValue::from("SN")),
        ("config", ConfigValue::map([("gain", ConfigValue::Int(3))])),
    ]);
    let flat = ConfigValue::map([("gain", ConfigValue::Int(3)), ("device_serial", ConfigValue::from("SN"))]);

    assert_eq!(resolve_instrument_state(conn, &nested).unwrap(), stored);
    assert_eq!(resolve_instrument_state(conn, &flat).unwrap(), stored);
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM instrument_states"), 1);
}

#[test]
fn capture_writes_linked_legacy_row() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2024-05-01 11:00:00");

    let ids = record_capture(conn, &capture(experiment_id, 2)).unwrap();

    let (set_id, data_id, flag): (i64, i64, String) = conn
        .query_row(
            "SELECT spectrum_set_id, data_id, quality_flag FROM spectra WHERE spectrum_id = ?1",
            [ids.spectrum_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!((set_id, data_id), (ids.spectrum_set_id, ids.data_id));
    assert_eq!(flag, "good");
    assert_eq!(query_text(conn, "SELECT result_variant FROM spectrum_sets").as_deref(), Some("Absorbance"));

    // already linked, so the data phase leaves it alone
    let report = crate::backfill::run(conn).unwrap();
    assert_eq!(report.spectra.migrated, 0);
}

#[test]
fn capture_without_snapshots_leaves_them_null() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2024-05-01 11:00:00");
    let bare = NewCapture {
        experiment_id,
        wavelengths: vec![1.0],
        intensities: vec![2.0],
        instrument: Some(ConfigValue::map(Vec::<(&str, ConfigValue)>::new())),
        ..NewCapture::default()
    };

    let ids = record_capture(conn, &bare).unwrap();

    assert_eq!(ids.instrument_state_id, None);
    assert_eq!(ids.processing_config_id, None);
    assert_eq!(query_text(conn, "SELECT capture_label FROM spectrum_sets").as_deref(), Some("Unknown"));
}

#[test]
fn mismatched_arrays_are_rejected() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let bad = NewCapture { experiment_id: 1, wavelengths: vec![1.0, 2.0], intensities: vec![1.0], ..NewCapture::default() };
    assert!(matches!(record_capture(conn, &bad), Err(StorageError::InvalidInput(_))));
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM spectrum_data"), 0);
}
