use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use obshub_db::{DbRuntimeSettings, ObsSystemDatabase, SqliteDatabase};
use obshub_filter::ObsFilter;
use obshub_hub::config::{Config, IdsConfig};
use obshub_hub::Hub;
use obshub_id::{IdEncoders, ResourceKind};
use obshub_ingest::{OutputDescriptor, Producer, ProducerEvent};
use obshub_types::{DataValue, FieldKind, FieldSchema, RecordSchema, SystemDescription};

struct Thermometer;

impl Producer for Thermometer {
    fn uid(&self) -> &str {
        "urn:test:thermometer"
    }

    fn description(&self) -> SystemDescription {
        let t0 = Utc.timestamp_opt(0, 0).single().expect("valid timestamp");
        SystemDescription::new("urn:test:thermometer", "thermometer", t0)
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        vec![OutputDescriptor::new(
            "temp",
            RecordSchema::new(
                "temp",
                vec![
                    FieldSchema::new("time", "urn:def:time", FieldKind::Time),
                    FieldSchema::new(
                        "value",
                        "urn:def:air_temperature",
                        FieldKind::Quantity { uom: "Cel".into() },
                    ),
                ],
            ),
        )]
    }
}

fn config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = dir.path().join("hub.db").to_string_lossy().into_owned();
    config.database.database_num = 4;
    config.ids = IdsConfig {
        keys_path: Some(dir.path().join("keys.toml").to_string_lossy().into_owned()),
    };
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn ingested_data_survives_shutdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(&dir);

    let hub = Hub::start(&config).await.expect("start");
    hub.registry().register(Arc::new(Thermometer));

    let mut attached = false;
    for _ in 0..100 {
        if hub.pipeline().is_attached("urn:test:thermometer") {
            attached = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(attached, "registered producer is attached");

    let now = Utc::now();
    hub.bus().publish(ProducerEvent::Data {
        producer_uid: "urn:test:thermometer".into(),
        output_name: "temp".into(),
        timestamp: now,
        foi_uid: None,
        records: vec![vec![DataValue::Time(now), DataValue::Double(19.0)]],
    });

    let mut stored = false;
    for _ in 0..100 {
        if hub.database().obs_store().count(&ObsFilter::default()).expect("count") == 1 {
            stored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(stored, "observation written");

    let (system_id, _) = hub
        .database()
        .system_store()
        .latest_by_uid("urn:test:thermometer")
        .expect("lookup")
        .expect("system stored");
    let external = hub.ids().encode(ResourceKind::System, &system_id);
    hub.shutdown().await.expect("shutdown");

    let db = SqliteDatabase::open(
        &config.database.path,
        DbRuntimeSettings {
            busy_timeout_ms: 1_000,
            database_num: 4,
        },
    )
    .expect("reopen");
    assert_eq!(db.obs_store().count(&ObsFilter::default()).expect("count"), 1);

    let keys_path = config.ids.keys_path.as_deref().expect("keys path");
    let ids = IdEncoders::load_or_create(std::path::Path::new(keys_path)).expect("keys");
    assert_eq!(ids.decode(ResourceKind::System, &external).expect("decode"), system_id);
}
