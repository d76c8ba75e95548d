//! Unit tests for the SQLite stores.

use chrono::{DateTime, TimeZone, Utc};
use obshub_filter::prelude::*;
use obshub_id::ScopedId;
use obshub_types::{
    Bbox, DataStreamInfo, DataValue, Feature, FieldKind, FieldSchema, Geometry, Observation,
    RecordEncoding, RecordSchema, SystemDescription, TimeExtent,
};

use super::SqliteDatabase;
use crate::error::StoreError;
use crate::store::ObsSystemDatabase;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn db() -> SqliteDatabase {
    SqliteDatabase::open_in_memory(1).expect("should open in-memory database")
}

fn add_system(db: &SqliteDatabase, uid: &str, parent: ScopedId) -> ScopedId {
    db.system_store()
        .add(&SystemDescription::new(uid, uid, t(0)).with_parent(parent))
        .expect("system stored")
}

fn weather_schema(with_humidity: bool) -> RecordSchema {
    let mut fields = vec![
        FieldSchema::new("time", "urn:def:time", FieldKind::Time),
        FieldSchema::new(
            "temperature",
            "urn:def:air_temperature",
            FieldKind::Quantity { uom: "Cel".into() },
        ),
    ];
    if with_humidity {
        fields.push(FieldSchema::new(
            "humidity",
            "urn:def:humidity",
            FieldKind::Quantity { uom: "%".into() },
        ));
    }
    RecordSchema::new("weather", fields)
}

fn add_stream(
    db: &SqliteDatabase,
    system_id: &ScopedId,
    system_uid: &str,
    output: &str,
    version: u32,
    from: DateTime<Utc>,
) -> ScopedId {
    db.datastream_store()
        .add(&DataStreamInfo {
            system_id: system_id.clone(),
            system_uid: system_uid.into(),
            output_name: output.into(),
            record_schema: weather_schema(version > 1),
            record_encoding: RecordEncoding::Json,
            valid_time: TimeExtent::starting_at(from),
            version,
        })
        .expect("datastream stored")
}

fn add_obs(db: &SqliteDatabase, ds: &ScopedId, foi: &ScopedId, secs: i64, value: f64) -> ScopedId {
    db.obs_store()
        .add(&Observation {
            datastream_id: ds.clone(),
            foi_id: foi.clone(),
            phenomenon_time: t(secs),
            result_time: t(secs),
            result: vec![DataValue::Time(t(secs)), DataValue::Double(value)],
        })
        .expect("observation stored")
}

// ── systems ──────────────────────────────────────────────────────────

#[test]
fn system_versions_share_one_id() {
    let db = db();
    let v1 = SystemDescription::new("urn:test:s1", "Station", t(0));
    let v2 = SystemDescription::new("urn:test:s1", "Station (moved)", t(100));

    let id1 = db.system_store().add(&v1).expect("v1");
    let id2 = db.system_store().add(&v2).expect("v2");
    assert_eq!(id1, id2);
    assert_eq!(id1.scope(), 1);

    let current = db.system_store().get(&id1).expect("get").expect("exists");
    assert_eq!(current.name, "Station (moved)");
    assert!(current.valid_time.has_open_end());

    let old = db.system_store().get_at(&id1, t(50)).expect("get_at").expect("exists");
    assert_eq!(old.name, "Station");
    assert_eq!(old.valid_time, TimeExtent::new(t(0), t(100)));

    let (latest_id, latest) = db
        .system_store()
        .latest_by_uid("urn:test:s1")
        .expect("lookup")
        .expect("exists");
    assert_eq!(latest_id, id1);
    assert_eq!(latest.name, "Station (moved)");
}

#[test]
fn system_select_defaults_to_current_versions() {
    let db = db();
    db.system_store()
        .add(&SystemDescription::new("urn:test:s1", "old", t(0)))
        .expect("v1");
    db.system_store()
        .add(&SystemDescription::new("urn:test:s1", "new", t(100)))
        .expect("v2");

    let current = db.system_store().select(&SystemFilter::default()).expect("select");
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].1.name, "new");

    let latest = db
        .system_store()
        .select(&SystemFilter::builder().with_current_version().build())
        .expect("select");
    assert_eq!(latest.len(), 1);

    let history = db
        .system_store()
        .select(&SystemFilter::builder().with_valid_time(TemporalFilter::range(t(0), t(200))).build())
        .expect("select");
    assert_eq!(history.len(), 2);

    let early = db
        .system_store()
        .select(&SystemFilter::builder().with_valid_time(TemporalFilter::instant(t(10))).build())
        .expect("select");
    assert_eq!(early.len(), 1);
    assert_eq!(early[0].1.name, "old");
}

#[test]
fn system_with_unknown_parent_is_rejected() {
    let db = db();
    let ghost = ScopedId::from_long(1, 99).expect("valid");
    let err = db
        .system_store()
        .add(&SystemDescription::new("urn:test:child", "child", t(0)).with_parent(ghost.clone()))
        .expect_err("parent does not exist");
    match err {
        StoreError::UnknownParent { kind, id } => {
            assert_eq!(kind, "system");
            assert_eq!(id, ghost);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(db.system_store().latest_by_uid("urn:test:child").expect("lookup").is_none());
}

#[test]
fn put_requires_matching_unique_id() {
    let db = db();
    let id = add_system(&db, "urn:test:s1", ScopedId::NONE);
    let other = SystemDescription::new("urn:test:s2", "other", t(0));
    assert!(matches!(
        db.system_store().put(&id, &other),
        Err(StoreError::InvalidData(_))
    ));

    let unknown = ScopedId::from_long(1, 42).expect("valid");
    assert!(matches!(
        db.system_store().put(&unknown, &other),
        Err(StoreError::NotFound { kind: "system", .. })
    ));

    let renamed = SystemDescription::new("urn:test:s1", "renamed", t(0));
    db.system_store().put(&id, &renamed).expect("put");
    assert_eq!(db.system_store().get(&id).expect("get").expect("exists").name, "renamed");
}

#[test]
fn members_are_included_on_request() {
    let db = db();
    let root = add_system(&db, "urn:test:group", ScopedId::NONE);
    let child = add_system(&db, "urn:test:member1", root.clone());
    let grandchild = add_system(&db, "urn:test:member1:sub", child.clone());
    add_system(&db, "urn:other:lone", ScopedId::NONE);

    let just_root = SystemFilter::builder().with_unique_ids(["urn:test:group"]).build();
    assert_eq!(db.system_store().select(&just_root).expect("select").len(), 1);

    let with_members = just_root.to_builder().include_members(true).build();
    let ids: Vec<ScopedId> = db
        .system_store()
        .select(&with_members)
        .expect("select")
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec![root.clone(), child.clone(), grandchild]);

    let children = SystemFilter::builder().with_parent_ids([root]).build();
    let found = db.system_store().select(&children).expect("select");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, child);
}

#[test]
fn unique_id_prefixes_select_systems() {
    let db = db();
    add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    add_system(&db, "urn:test:sensor2", ScopedId::NONE);
    add_system(&db, "urn:TEST:sensor3", ScopedId::NONE);

    let f = SystemFilter::builder().with_unique_ids(["urn:test:*"]).build();
    let uids: Vec<String> = db
        .system_store()
        .select(&f)
        .expect("select")
        .into_iter()
        .map(|(_, s)| s.uid)
        .collect();
    assert_eq!(uids, vec!["urn:test:sensor1", "urn:test:sensor2"]);
}

#[test]
fn foreign_scope_ids_are_not_found() {
    let db = db();
    let id = add_system(&db, "urn:test:s1", ScopedId::NONE);
    let foreign = ScopedId::from_long(2, id.as_long().expect("long")).expect("valid");
    assert!(db.system_store().get(&foreign).expect("get").is_none());

    let f = SystemFilter::builder().with_internal_ids([foreign]).build();
    assert!(db.system_store().select(&f).expect("select").is_empty());
}

// ── datastreams ──────────────────────────────────────────────────────

#[test]
fn datastream_versions_are_separate_resources() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let v1 = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    let v2 = add_stream(&db, &sys, "urn:test:sensor1", "weather", 2, t(100));
    assert_ne!(v1, v2);

    let all = db
        .datastream_store()
        .select(&DataStreamFilter::default())
        .expect("select");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].1.valid_time, TimeExtent::new(t(0), t(100)));

    let current = db
        .datastream_store()
        .select(&DataStreamFilter::builder().with_current_version().build())
        .expect("select");
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].0, v2);

    let (latest, info) = db
        .datastream_store()
        .latest_for_output("urn:test:sensor1", "weather")
        .expect("lookup")
        .expect("exists");
    assert_eq!(latest, v2);
    assert_eq!(info.version, 2);
}

#[test]
fn datastream_add_is_idempotent_per_version() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let a = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    let b = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    assert_eq!(a, b);
}

#[test]
fn datastream_needs_an_existing_system() {
    let db = db();
    let ghost = ScopedId::from_long(1, 5).expect("valid");
    let err = db
        .datastream_store()
        .add(&DataStreamInfo {
            system_id: ghost,
            system_uid: "urn:ghost".into(),
            output_name: "weather".into(),
            record_schema: weather_schema(false),
            record_encoding: RecordEncoding::Json,
            valid_time: TimeExtent::starting_at(t(0)),
            version: 1,
        })
        .expect_err("unknown system");
    assert!(matches!(err, StoreError::UnknownParent { kind: "system", .. }));
}

#[test]
fn datastreams_filter_by_linked_system_and_properties() {
    let db = db();
    let s1 = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let s2 = add_system(&db, "urn:test:camera", ScopedId::NONE);
    add_stream(&db, &s1, "urn:test:sensor1", "weather", 1, t(0));
    add_stream(&db, &s2, "urn:test:camera", "video", 1, t(0));

    let by_system = DataStreamFilter::builder()
        .with_systems_matching(|s| s.with_unique_ids(["urn:test:camera"]))
        .build();
    let found = db.datastream_store().select(&by_system).expect("select");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1.output_name, "video");

    let by_names = DataStreamFilter::builder().with_output_names(["weather", "other"]).build();
    assert_eq!(db.datastream_store().select(&by_names).expect("select").len(), 1);

    let systems_with_weather = SystemFilter::builder()
        .with_datastreams_matching(|d| d.with_output_names(["weather"]))
        .build();
    let found = db.system_store().select(&systems_with_weather).expect("select");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, s1);
}

// ── features of interest ─────────────────────────────────────────────

#[test]
fn foi_add_is_keyed_by_unique_id() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let foi = Feature::new("urn:foi:lake", "Lake");
    let a = db.foi_store().add(&sys, &foi).expect("add");
    let b = db.foi_store().add(&ScopedId::NONE, &foi).expect("add again");
    assert_eq!(a, b);

    let (id, stored) = db.foi_store().get_by_uid("urn:foi:lake").expect("lookup").expect("exists");
    assert_eq!(id, a);
    assert_eq!(stored, foi);

    let by_parent = FoiFilter::builder().with_parent_ids([sys]).build();
    assert_eq!(db.foi_store().select(&by_parent).expect("select").len(), 1);
}

#[test]
fn foi_with_unknown_parent_is_rejected() {
    let db = db();
    let ghost = ScopedId::from_long(1, 7).expect("valid");
    let err = db
        .foi_store()
        .add(&ghost, &Feature::new("urn:foi:x", "x"))
        .expect_err("unknown parent");
    assert!(matches!(err, StoreError::UnknownParent { kind: "system", .. }));
}

// ── observations ─────────────────────────────────────────────────────

#[test]
fn observation_needs_existing_parents() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let ds = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    let ghost = ScopedId::from_long(1, 1000).expect("valid");

    let mut obs = Observation {
        datastream_id: ghost.clone(),
        foi_id: ScopedId::NONE,
        phenomenon_time: t(1),
        result_time: t(1),
        result: vec![],
    };
    assert!(matches!(
        db.obs_store().add(&obs),
        Err(StoreError::UnknownParent { kind: "datastream", .. })
    ));

    obs.datastream_id = ds;
    obs.foi_id = ghost;
    assert!(matches!(
        db.obs_store().add(&obs),
        Err(StoreError::UnknownParent { kind: "foi", .. })
    ));
}

#[test]
fn observations_filter_by_time_and_foi() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let ds = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    let lake = db
        .foi_store()
        .add(&sys, &Feature::new("urn:foi:lake", "Lake"))
        .expect("foi");

    add_obs(&db, &ds, &ScopedId::NONE, 100, 21.5);
    add_obs(&db, &ds, &ScopedId::NONE, 200, 22.0);
    add_obs(&db, &ds, &lake, 300, 12.0);

    let all = ObsFilter::default();
    assert_eq!(db.obs_store().count(&all).expect("count"), 3);

    let window = ObsFilter::builder().with_phenomenon_time_during(t(150), t(300)).build();
    assert_eq!(db.obs_store().count(&window).expect("count"), 2);

    let latest = db
        .obs_store()
        .select(&ObsFilter::builder().with_latest_result().build())
        .expect("select");
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].1.phenomenon_time, t(300));

    let without_foi = ObsFilter::builder().with_foi_ids([ScopedId::NONE]).build();
    assert_eq!(db.obs_store().count(&without_foi).expect("count"), 2);

    let at_lake = ObsFilter::builder().with_foi_ids([lake.clone()]).build();
    let found = db.obs_store().select(&at_lake).expect("select");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1.foi_id, lake);

    let either = ObsFilter::builder().with_foi_ids([ScopedId::NONE, lake]).build();
    assert_eq!(db.obs_store().count(&either).expect("count"), 3);

    assert_eq!(
        db.obs_store().latest_phenomenon_time(&ds).expect("latest"),
        Some(t(300))
    );
}

#[test]
fn observations_are_paged_in_time_order() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let ds = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    for secs in [500, 100, 300, 200, 400] {
        add_obs(&db, &ds, &ScopedId::NONE, secs, 1.0);
    }

    let page = ObsFilter::builder().with_skip(1).with_limit(2).build();
    let times: Vec<_> = db
        .obs_store()
        .select(&page)
        .expect("select")
        .into_iter()
        .map(|(_, o)| o.phenomenon_time)
        .collect();
    assert_eq!(times, vec![t(200), t(300)]);
}

#[test]
fn observations_follow_linked_datastreams() {
    let db = db();
    let s1 = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let s2 = add_system(&db, "urn:test:sensor2", ScopedId::NONE);
    let d1 = add_stream(&db, &s1, "urn:test:sensor1", "weather", 1, t(0));
    let d2 = add_stream(&db, &s2, "urn:test:sensor2", "weather", 1, t(0));
    add_obs(&db, &d1, &ScopedId::NONE, 10, 1.0);
    add_obs(&db, &d2, &ScopedId::NONE, 10, 2.0);
    add_obs(&db, &d2, &ScopedId::NONE, 20, 3.0);

    let f = ObsFilter::builder()
        .with_datastreams_matching(|d| d.with_systems_matching(|s| s.with_unique_ids(["urn:test:sensor2"])))
        .build();
    assert_eq!(db.obs_store().count(&f).expect("count"), 2);

    let by_id = ObsFilter::builder().with_datastream_ids([d1.clone()]).build();
    let found = db.obs_store().select(&by_id).expect("select");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1.datastream_id, d1);
}

#[test]
fn phenomenon_location_goes_through_fois() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let ds = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    let near = db
        .foi_store()
        .add(&sys, &Feature::new("urn:foi:near", "near").with_geometry(Geometry::Point { x: 1.0, y: 1.0 }))
        .expect("foi");
    let far = db
        .foi_store()
        .add(&sys, &Feature::new("urn:foi:far", "far").with_geometry(Geometry::Point { x: 50.0, y: 50.0 }))
        .expect("foi");
    add_obs(&db, &ds, &near, 10, 1.0);
    add_obs(&db, &ds, &far, 20, 2.0);
    add_obs(&db, &ds, &ScopedId::NONE, 30, 3.0);

    let f = ObsFilter::builder()
        .with_phenomenon_location_within(Bbox::new(0.0, 0.0, 10.0, 10.0))
        .build();
    let found = db.obs_store().select(&f).expect("select");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1.foi_id, near);

    let observed_fois = FoiFilter::builder()
        .with_observations_matching(|o| o.with_phenomenon_time_during(t(15), t(25)))
        .build();
    let fois = db.foi_store().select(&observed_fois).expect("select");
    assert_eq!(fois.len(), 1);
    assert_eq!(fois[0].0, far);
}

// ── removal ──────────────────────────────────────────────────────────

#[test]
fn removing_a_system_removes_its_data() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let keep = add_system(&db, "urn:test:sensor2", ScopedId::NONE);
    let ds = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    let kept_ds = add_stream(&db, &keep, "urn:test:sensor2", "weather", 1, t(0));
    add_obs(&db, &ds, &ScopedId::NONE, 10, 1.0);
    add_obs(&db, &kept_ds, &ScopedId::NONE, 10, 1.0);

    let removed = db
        .system_store()
        .remove(&SystemFilter::builder().with_internal_ids([sys.clone()]).build())
        .expect("remove");
    assert_eq!(removed, 1);
    assert!(db.system_store().get(&sys).expect("get").is_none());
    assert!(db.datastream_store().get(&ds).expect("get").is_none());
    assert_eq!(db.obs_store().count(&ObsFilter::default()).expect("count"), 1);
}

#[test]
fn removing_old_observations() {
    let db = db();
    let sys = add_system(&db, "urn:test:sensor1", ScopedId::NONE);
    let ds = add_stream(&db, &sys, "urn:test:sensor1", "weather", 1, t(0));
    for secs in [10, 20, 30, 40] {
        add_obs(&db, &ds, &ScopedId::NONE, secs, 1.0);
    }
    let old = ObsFilter::builder()
        .with_phenomenon_time(TemporalFilter::range(DateTime::<Utc>::MIN_UTC, t(25)))
        .build();
    assert_eq!(db.obs_store().remove(&old).expect("remove"), 2);
    assert_eq!(db.obs_store().count(&ObsFilter::default()).expect("count"), 2);
}
