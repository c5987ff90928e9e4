use rusqlite::Connection;

use super::{create_legacy_conn, create_test_store, query_i64};
use crate::error::{Result, StorageError};
use crate::migrations::{
    LEGACY_COMPAT_VIEWS, MigrationRegistry, PREPARE_PHASE1_SCHEMA, SNAPSHOT_SOFT_DELETE,
};

fn create_widgets(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE widgets (id INTEGER PRIMARY KEY)")?;
    Ok(())
}

fn broken(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE half_done (id INTEGER); SELECT * FROM no_such_table;")?;
    Ok(())
}

fn never_runs(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE never (id INTEGER)")?;
    Ok(())
}

#[test]
fn builtin_units_apply_once() {
    let (mut conn, _dir) = create_legacy_conn();
    let registry = MigrationRegistry::builtin();

    let first = registry.run(&mut conn, false).unwrap();
    assert_eq!(first, vec![PREPARE_PHASE1_SCHEMA, SNAPSHOT_SOFT_DELETE, LEGACY_COMPAT_VIEWS]);

    let second = registry.run(&mut conn, false).unwrap();
    assert!(second.is_empty());
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM schema_migrations"), 3);
}

#[test]
fn dry_run_lists_without_applying() {
    let (mut conn, _dir) = create_legacy_conn();
    let registry = MigrationRegistry::builtin();

    let pending = registry.run(&mut conn, true).unwrap();
    assert_eq!(pending.len(), 3);
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM schema_migrations"), 0);
    assert_eq!(
        query_i64(&conn, "SELECT COUNT(*) FROM sqlite_master WHERE name = 'spectrum_sets'"),
        0
    );
    assert_eq!(registry.get_pending(&conn).unwrap().len(), 3);
}

#[test]
fn failure_rolls_back_and_stops() {
    let (mut conn, _dir) = create_legacy_conn();
    let mut registry = MigrationRegistry::new();
    registry
        .register("0001_widgets", create_widgets)
        .unwrap()
        .register("0002_broken", broken)
        .unwrap()
        .register("0003_never", never_runs)
        .unwrap();

    let (id, applied) = match registry.run(&mut conn, false) {
        Err(StorageError::MigrationFailed { id, applied, .. }) => (id, applied),
        other => panic!("expected MigrationFailed, got {other:?}"),
    };
    assert_eq!(id, "0002_broken");
    assert_eq!(applied, vec!["0001_widgets".to_owned()]);

    // the broken unit left nothing behind and the third never ran
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM sqlite_master WHERE name = 'half_done'"), 0);
    assert_eq!(query_i64(&conn, "SELECT COUNT(*) FROM sqlite_master WHERE name = 'never'"), 0);
    let pending: Vec<&str> = registry.get_pending(&conn).unwrap().iter().map(|m| m.id).collect();
    assert_eq!(pending, vec!["0002_broken", "0003_never"]);
}

#[test]
fn register_rejects_bad_and_duplicate_ids() {
    let mut registry = MigrationRegistry::new();
    assert!(matches!(registry.register("widgets", create_widgets), Err(StorageError::InvalidMigration(_))));
    registry.register("0001_widgets", create_widgets).unwrap();
    assert!(matches!(
        registry.register("0001_widgets", create_widgets),
        Err(StorageError::InvalidMigration(_))
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn status_reports_applied_units() {
    let (store, _dir) = create_test_store();
    let status = store.migration_status().unwrap();
    assert_eq!(status.len(), 3);
    assert!(status.iter().all(|s| s.applied_at.is_some()));
}

#[test]
fn soft_delete_column_defaults_to_active() {
    let (store, _dir) = create_test_store();
    let conn = store.conn();
    conn.execute(
        "INSERT INTO processing_snapshots (name, version, parameters_json) VALUES ('p', '1', '{}')",
        [],
    )
    .unwrap();
    assert_eq!(query_i64(conn, "SELECT is_active FROM processing_snapshots"), 1);
}

#[test]
fn reopening_a_store_is_a_no_op() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    drop(crate::Store::open(&path).unwrap());
    let mut store = crate::Store::open(&path).unwrap();
    assert!(store.bootstrap().unwrap().is_empty());
}

#[test]
fn legacy_experiments_get_metadata_and_versions() {
    let (mut conn, _dir) = create_legacy_conn();
    super::insert_experiment(&conn, None, "exp", "2024-02-02 08:00:00");
    MigrationRegistry::builtin().run(&mut conn, false).unwrap();

    assert_eq!(super::query_text(&conn, "SELECT status FROM experiments").as_deref(), Some("completed"));
    assert_eq!(
        super::query_text(&conn, "SELECT created_at FROM experiments").as_deref(),
        Some("2024-02-02 08:00:00")
    );
    assert_eq!(query_i64(&conn, "SELECT version_no FROM experiment_versions"), 1);
}
