use nanosense_core::timestamp::parse_timestamp;
use rusqlite::Connection;

use super::{
    create_test_store, insert_experiment, insert_instrument_state, insert_processing_snapshot, query_i64,
    reference_snapshots,
};
use crate::error::StorageError;
use crate::governance::{CleanupPolicy, CleanupStatus, Cutoff, SnapshotTable, cleanup};

fn is_active(conn: &Connection, table: SnapshotTable, id: i64) -> i64 {
    query_i64(conn, &format!("SELECT is_active FROM {table} WHERE {} = {id}", table.id_column()))
}

fn policy(cutoff: Cutoff, dry_run: bool) -> CleanupPolicy {
    CleanupPolicy { dry_run, ..CleanupPolicy::new(cutoff) }
}

#[test]
fn referenced_rows_survive_any_age() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2000-01-01 00:00:00");
    let referenced = insert_instrument_state(conn, "SN-1", 25.0, "{}", "2000-01-01 00:00:00");
    let orphan = insert_instrument_state(conn, "SN-2", 25.0, "{}", "2000-01-01 00:00:00");
    let fresh = insert_instrument_state(conn, "SN-3", 25.0, "{}", "2999-01-01 00:00:00");
    reference_snapshots(conn, experiment_id, Some(referenced), None);

    let report = cleanup(conn, &policy(Cutoff::AgeDays(30), false)).unwrap();

    let instruments = &report.tables[0];
    assert_eq!(instruments.table, SnapshotTable::InstrumentStates);
    assert_eq!(instruments.candidates.iter().map(|c| c.record_id).collect::<Vec<_>>(), vec![orphan]);
    assert_eq!(instruments.updated_count, 1);
    assert_eq!(is_active(conn, SnapshotTable::InstrumentStates, referenced), 1);
    assert_eq!(is_active(conn, SnapshotTable::InstrumentStates, orphan), 0);
    assert_eq!(is_active(conn, SnapshotTable::InstrumentStates, fresh), 1);
    // rows are deactivated, never deleted
    assert_eq!(query_i64(conn, "SELECT COUNT(*) FROM instrument_states"), 3);
}

#[test]
fn experiment_references_protect_processing_snapshots() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let experiment_id = insert_experiment(conn, None, "exp", "2000-01-01 00:00:00");
    let pinned = insert_processing_snapshot(conn, "smooth", r#"{"window": 5}"#, "2000-01-01 00:00:00");
    conn.execute("UPDATE experiments SET processing_config_id = ?1 WHERE experiment_id = ?2", [pinned, experiment_id])
        .unwrap();

    let report = cleanup(conn, &policy(Cutoff::AgeDays(1), false)).unwrap();

    assert!(report.tables[1].candidates.is_empty());
    assert_eq!(is_active(conn, SnapshotTable::ProcessingSnapshots, pinned), 1);
}

#[test]
fn dry_run_reports_without_writing() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let orphan = insert_processing_snapshot(conn, "smooth", "{}", "2001-06-01 00:00:00");

    let report = cleanup(conn, &policy(Cutoff::AgeDays(30), true)).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.tables[1].candidates.len(), 1);
    assert_eq!(report.tables[1].candidates[0].record_id, orphan);
    assert_eq!(report.tables[1].candidates[0].fingerprint.len(), 64);
    assert_eq!(report.tables[1].updated_count, 0);
    assert_eq!(is_active(conn, SnapshotTable::ProcessingSnapshots, orphan), 1);
}

#[test]
fn window_bounds_and_unparsable_timestamps() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    let too_old = insert_instrument_state(conn, "A", 1.0, "{}", "2000-01-01 00:00:00");
    let inside = insert_instrument_state(conn, "B", 2.0, "{}", "2010-01-01T00:00:00");
    let garbage = insert_instrument_state(conn, "C", 3.0, "{}", "not a date");
    let after = insert_instrument_state(conn, "D", 4.0, "{}", "2020-01-01 00:00:00");

    let mut window = policy(Cutoff::At(parse_timestamp("2015-01-01").unwrap()), false);
    window.window_start = parse_timestamp("2005-01-01");
    window.tables = vec![SnapshotTable::InstrumentStates];
    let report = cleanup(conn, &window).unwrap();

    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.tables[0].candidates.iter().map(|c| c.record_id).collect::<Vec<_>>(), vec![inside]);
    for id in [too_old, garbage, after] {
        assert_eq!(is_active(conn, SnapshotTable::InstrumentStates, id), 1);
    }
    assert_eq!(report.window_start.as_deref(), Some("2005-01-01 00:00:00"));
    assert_eq!(report.cutoff, "2015-01-01 00:00:00");
}

#[test]
fn window_start_after_cutoff_is_rejected() {
    let (store, _dir) = create_test_store();
    let mut bad = policy(Cutoff::At(parse_timestamp("2015-01-01").unwrap()), false);
    bad.window_start = parse_timestamp("2016-01-01");
    assert!(matches!(cleanup(store.conn(), &bad), Err(StorageError::InvalidInput(_))));
}

#[test]
fn unrepresentable_age_is_rejected() {
    let (store, _dir) = create_test_store();
    insert_instrument_state(store.conn(), "A", 1.0, "{}", "2000-01-01 00:00:00");

    let result = cleanup(store.conn(), &CleanupPolicy::new(Cutoff::AgeDays(200_000_000)));

    assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    assert_eq!(query_i64(store.conn(), "SELECT COUNT(*) FROM instrument_states WHERE is_active = 1"), 1);
}

#[test]
fn inactive_rows_are_not_candidates_again() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    insert_instrument_state(conn, "A", 1.0, "{}", "2000-01-01 00:00:00");

    let first = cleanup(conn, &policy(Cutoff::AgeDays(1), false)).unwrap();
    let second = cleanup(conn, &policy(Cutoff::AgeDays(1), false)).unwrap();

    assert_eq!(first.tables[0].updated_count, 1);
    assert!(second.tables[0].candidates.is_empty());
}

#[test]
fn tables_without_soft_delete_are_skipped() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE instrument_states (
            instrument_state_id INTEGER PRIMARY KEY, device_serial TEXT, integration_time_ms REAL,
            averaging INTEGER, temperature REAL, config_json TEXT, captured_at TEXT
         );
         INSERT INTO instrument_states (device_serial, captured_at) VALUES ('A', '2000-01-01 00:00:00');",
    )
    .unwrap();

    let report = cleanup(&conn, &policy(Cutoff::AgeDays(1), false)).unwrap();

    assert_eq!(report.tables[0].status, CleanupStatus::NoSoftDelete);
    assert_eq!(report.tables[1].status, CleanupStatus::TableMissing);
}
