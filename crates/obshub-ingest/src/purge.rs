//! Trimming of old records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use obshub_db::{ObsSystemDatabase, StoreError};
use obshub_filter::prelude::*;
use obshub_id::ScopedId;
use tokio::time::sleep;

use crate::commit::CommitScheduler;

/// Records removed by one purge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub datastreams: usize,
    pub observations: usize,
}

/// Decides what to trim from the database.
pub trait PurgePolicy: Send + Sync {
    /// Trims records of the systems matching `system_uids` (and their
    /// members). An empty list means every system.
    fn trim(&self, db: &dyn ObsSystemDatabase, system_uids: &[String]) -> Result<PurgeReport, StoreError>;
}

/// Keeps observations no older than `max_age` before the latest one of
/// their datastream, and drops datastream versions retired for longer than
/// `max_age`.
#[derive(Debug, Clone, Copy)]
pub struct MaxAgePurgePolicy {
    max_age: chrono::Duration,
}

impl MaxAgePurgePolicy {
    pub fn new(max_age: chrono::Duration) -> Self {
        Self { max_age }
    }

    fn trim_at(
        &self,
        db: &dyn ObsSystemDatabase,
        system_uids: &[String],
        now: DateTime<Utc>,
    ) -> Result<PurgeReport, StoreError> {
        let systems = SystemFilter::builder()
            .with_unique_ids(system_uids.iter().cloned())
            .include_members(true)
            .build();
        let streams = db
            .datastream_store()
            .select(&DataStreamFilter::builder().with_systems(systems).build())?;

        let horizon = now - self.max_age;
        let (retired, live): (Vec<_>, Vec<_>) = streams
            .into_iter()
            .partition(|(_, ds)| !ds.valid_time.has_open_end() && ds.valid_time.end() < horizon);

        let mut report = PurgeReport::default();
        if !retired.is_empty() {
            let ids: Vec<ScopedId> = retired.into_iter().map(|(id, _)| id).collect();
            report.datastreams = db
                .datastream_store()
                .remove(&DataStreamFilter::builder().with_internal_ids(ids).build())?;
        }

        for (id, _) in live {
            let Some(latest) = db.obs_store().latest_phenomenon_time(&id)? else {
                continue;
            };
            let oldest = latest - self.max_age;
            report.observations += db.obs_store().remove(
                &ObsFilter::builder()
                    .with_datastream_ids([id])
                    .with_phenomenon_time(TemporalFilter::range(DateTime::<Utc>::MIN_UTC, oldest))
                    .build(),
            )?;
        }

        Ok(report)
    }
}

impl PurgePolicy for MaxAgePurgePolicy {
    fn trim(&self, db: &dyn ObsSystemDatabase, system_uids: &[String]) -> Result<PurgeReport, StoreError> {
        let report = self.trim_at(db, system_uids, Utc::now())?;
        tracing::info!(
            max_age_secs = self.max_age.num_seconds(),
            datastreams = report.datastreams,
            observations = report.observations,
            "purged old records"
        );
        Ok(report)
    }
}

/// Runs `policy` every `interval` until aborted.
pub async fn run_purge_task(
    db: Arc<dyn ObsSystemDatabase>,
    commits: Arc<CommitScheduler>,
    policy: Arc<dyn PurgePolicy>,
    system_uids: Vec<String>,
    interval: Duration,
) {
    tracing::info!(interval_secs = interval.as_secs(), "starting auto-purge task");

    loop {
        sleep(interval).await;

        let db = db.clone();
        let commits = commits.clone();
        let policy = policy.clone();
        let uids = system_uids.clone();
        let result = tokio::task::spawn_blocking(move || {
            let report = policy.trim(db.as_ref(), &uids)?;
            if report != PurgeReport::default() {
                commits.record_write()?;
            }
            Ok::<PurgeReport, StoreError>(report)
        })
        .await;

        match result {
            Ok(Ok(report)) => {
                tracing::debug!(?report, "auto-purge run finished");
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "auto-purge failed");
            }
            Err(e) => {
                tracing::error!(error = %e, "auto-purge task panicked or was cancelled");
            }
        }
    }
}
