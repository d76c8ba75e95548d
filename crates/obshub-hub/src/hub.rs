//! Wiring of the store, id encoders and ingestion pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use obshub_db::{DbRuntimeSettings, ObsSystemDatabase, SqliteDatabase, StoreError};
use obshub_id::{IdEncoders, IdError};
use obshub_ingest::{
    EventBus, IngestError, IngestPipeline, IngestSettings, MaxAgePurgePolicy, ProducerRegistry,
    PurgeSchedule,
};
use thiserror::Error;

use crate::config::Config;

/// Errors that stop the hub from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to open database: {0}")]
    Store(#[from] StoreError),

    #[error("failed to load id encoder keys: {0}")]
    Ids(#[from] IdError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// A running hub. Producers registered in [`Hub::registry`] and publishing
/// on [`Hub::bus`] are persisted.
pub struct Hub {
    db: Arc<SqliteDatabase>,
    ids: IdEncoders,
    registry: Arc<ProducerRegistry>,
    pipeline: IngestPipeline,
}

impl Hub {
    /// Opens the database, loads the id keys and starts ingestion.
    ///
    /// # Errors
    ///
    /// Returns the first startup failure.
    pub async fn start(config: &Config) -> Result<Self, HubError> {
        let db = Arc::new(SqliteDatabase::open(
            &config.database.path,
            DbRuntimeSettings {
                busy_timeout_ms: config.database.busy_timeout_ms,
                database_num: config.database.database_num,
            },
        )?);

        let ids = match &config.ids.keys_path {
            Some(path) => IdEncoders::load_or_create(Path::new(path))?,
            None => {
                tracing::warn!("no ids.keys_path configured, external ids will change on restart");
                IdEncoders::generate()?
            }
        };

        let purge = config.ingest.auto_purge.enabled.then(|| {
            let max_age_secs = i64::from(u32::try_from(config.ingest.auto_purge.max_age_secs).unwrap_or(u32::MAX));
            PurgeSchedule {
                policy: Arc::new(MaxAgePurgePolicy::new(chrono::Duration::seconds(max_age_secs))),
                interval: Duration::from_secs(config.ingest.auto_purge.interval_secs.max(1)),
            }
        });

        let store: Arc<dyn ObsSystemDatabase> = db.clone();
        let pipeline = IngestPipeline::new(
            store,
            EventBus::new(),
            IngestSettings {
                min_commit_period: config.ingest.min_commit_period(),
                handled_systems: config.ingest.handled_systems.clone(),
            },
            purge,
        )?;

        let registry = Arc::new(ProducerRegistry::new());
        pipeline.start(registry.clone()).await;

        tracing::info!(
            path = %config.database.path,
            database_num = config.database.database_num,
            handled = config.ingest.handled_systems.len(),
            auto_purge = config.ingest.auto_purge.enabled,
            "obshub started"
        );

        Ok(Self {
            db,
            ids,
            registry,
            pipeline,
        })
    }

    pub fn database(&self) -> &Arc<SqliteDatabase> {
        &self.db
    }

    pub fn ids(&self) -> &IdEncoders {
        &self.ids
    }

    pub fn registry(&self) -> &Arc<ProducerRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        self.pipeline.bus()
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    /// Detaches every producer and commits pending writes.
    ///
    /// # Errors
    ///
    /// Returns the final commit failure.
    pub async fn shutdown(self) -> Result<(), HubError> {
        self.pipeline.stop().await?;
        Ok(())
    }
}
