use chrono::{TimeZone, Utc};
use obshub_db::{DbRuntimeSettings, ObsSystemDatabase, SqliteDatabase};
use obshub_types::SystemDescription;

fn settings() -> DbRuntimeSettings {
    DbRuntimeSettings {
        busy_timeout_ms: 1_000,
        database_num: 3,
    }
}

#[test]
fn only_committed_writes_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hub.db");
    let t0 = Utc.timestamp_opt(0, 0).single().expect("valid");

    let committed_id = {
        let db = SqliteDatabase::open(&path, settings()).expect("open");
        let id = db
            .system_store()
            .add(&SystemDescription::new("urn:test:kept", "kept", t0))
            .expect("add");
        db.commit().expect("commit");

        db.system_store()
            .add(&SystemDescription::new("urn:test:lost", "lost", t0))
            .expect("add");
        // visible before commit
        assert!(db.system_store().latest_by_uid("urn:test:lost").expect("lookup").is_some());
        id
    };

    let db = SqliteDatabase::open(&path, settings()).expect("reopen");
    let (id, kept) = db
        .system_store()
        .latest_by_uid("urn:test:kept")
        .expect("lookup")
        .expect("committed system survives");
    assert_eq!(id, committed_id);
    assert_eq!(id.scope(), 3);
    assert_eq!(kept.name, "kept");
    assert!(db.system_store().latest_by_uid("urn:test:lost").expect("lookup").is_none());
}

#[test]
fn reopening_does_not_reapply_migrations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hub.db");
    drop(SqliteDatabase::open(&path, settings()).expect("open"));

    let conn = obshub_db::open_connection(&path, settings()).expect("connection");
    assert_eq!(obshub_db::run_migrations(&conn).expect("migrations"), 0);
}
