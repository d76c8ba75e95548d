//! Keeps the store in step with live producers.
//!
//! Attaching a producer registers its description, one datastream per
//! enabled output and its current feature of interest, then subscribes to
//! its events. Each producer's events are handled one at a time in arrival
//! order on a blocking worker; different producers run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use obshub_db::ObsSystemDatabase;
use obshub_id::ScopedId;
use obshub_types::{DataStreamInfo, DataValue, Feature, Observation, TimeExtent, TimeExtractor};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::bus::{EventBus, SubscriptionHandle};
use crate::commit::{run_flush_task, CommitScheduler};
use crate::error::IngestError;
use crate::producer::{Producer, ProducerEvent};
use crate::purge::{run_purge_task, PurgePolicy};
use crate::registry::{ProducerRegistry, RegistryEvent};

/// Deepest group nesting followed when attaching members.
pub const MAX_MEMBER_DEPTH: usize = 8;

/// Pipeline tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Minimum time between two durable commits.
    pub min_commit_period: Duration,
    /// Unique ids of the producers to attach; a trailing `*` matches a
    /// prefix. Empty means every producer.
    pub handled_systems: Vec<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            min_commit_period: Duration::from_secs(1),
            handled_systems: Vec::new(),
        }
    }
}

/// A purge policy and how often to run it.
#[derive(Clone)]
pub struct PurgeSchedule {
    pub policy: Arc<dyn PurgePolicy>,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
struct OutputState {
    datastream_id: ScopedId,
    time: TimeExtractor,
}

struct ProducerState {
    system_id: ScopedId,
    parent_id: ScopedId,
    outputs: HashMap<String, OutputState>,
    current_foi: ScopedId,
    members: Vec<String>,
    subscription: SubscriptionHandle,
    /// Set under the lock by detach; queued events are dropped after it.
    detached: bool,
}

struct PipelineInner {
    db: Arc<dyn ObsSystemDatabase>,
    bus: EventBus,
    commits: Arc<CommitScheduler>,
    settings: IngestSettings,
    purge: Option<PurgeSchedule>,
    runtime: Handle,
    producers: RwLock<HashMap<String, Arc<Mutex<ProducerState>>>>,
    /// Serializes attach and detach.
    membership: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The live-ingestion pipeline. Cheap to clone.
#[derive(Clone)]
pub struct IngestPipeline {
    inner: Arc<PipelineInner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Whether `uid` matches one of `patterns`. No patterns match everything.
fn matches_patterns(patterns: &[String], uid: &str) -> bool {
    patterns.is_empty()
        || patterns.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => uid.starts_with(prefix),
            None => p == uid,
        })
}

impl IngestPipeline {
    /// Creates a pipeline writing to `db` and listening on `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NoRuntime`] outside a tokio runtime.
    pub fn new(
        db: Arc<dyn ObsSystemDatabase>,
        bus: EventBus,
        settings: IngestSettings,
        purge: Option<PurgeSchedule>,
    ) -> Result<Self, IngestError> {
        let runtime = Handle::try_current().map_err(|e| IngestError::NoRuntime(e.to_string()))?;
        let commits = Arc::new(CommitScheduler::new(db.clone(), settings.min_commit_period));
        Ok(Self {
            inner: Arc::new(PipelineInner {
                db,
                bus,
                commits,
                settings,
                purge,
                runtime,
                producers: RwLock::new(HashMap::new()),
                membership: Mutex::new(()),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn database(&self) -> &Arc<dyn ObsSystemDatabase> {
        &self.inner.db
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Whether this pipeline attaches the producer with unique id `uid`.
    pub fn handles(&self, uid: &str) -> bool {
        matches_patterns(&self.inner.settings.handled_systems, uid)
    }

    pub fn is_attached(&self, uid: &str) -> bool {
        self.inner
            .producers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(uid)
    }

    /// Unique ids of attached producers, members included.
    pub fn attached(&self) -> Vec<String> {
        let mut uids: Vec<String> = self
            .inner
            .producers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        uids.sort();
        uids
    }

    fn state(&self, uid: &str) -> Option<Arc<Mutex<ProducerState>>> {
        self.inner
            .producers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(uid)
            .cloned()
    }

    /// Attaches `producer` and its members and returns its system id.
    /// Attaching an attached producer returns its id and changes nothing.
    /// Blocks on store writes.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NotHandled`] if the producer matches no
    /// handled-system pattern, or the store error that stopped the attach.
    /// On error nothing new is attached. Members that fail to attach are
    /// logged and skipped.
    pub fn attach(&self, producer: Arc<dyn Producer>) -> Result<ScopedId, IngestError> {
        if !self.handles(producer.uid()) {
            return Err(IngestError::NotHandled(producer.uid().to_string()));
        }
        let _membership = lock(&self.inner.membership);
        let mut path = Vec::new();
        self.attach_tree(producer.as_ref(), &ScopedId::NONE, 0, &mut path)
    }

    fn attach_tree(
        &self,
        producer: &dyn Producer,
        parent_id: &ScopedId,
        depth: usize,
        path: &mut Vec<String>,
    ) -> Result<ScopedId, IngestError> {
        let uid = producer.uid().to_string();
        if let Some(existing) = self.state(&uid) {
            tracing::debug!(uid = %uid, "producer already attached");
            return Ok(lock(&existing).system_id.clone());
        }
        if path.contains(&uid) {
            return Err(IngestError::MemberCycle(uid));
        }
        if depth > MAX_MEMBER_DEPTH {
            return Err(IngestError::MemberDepth { uid, depth });
        }

        let system_id = self.register_system(producer, parent_id)?;
        let outputs = self.register_outputs(producer, &system_id)?;
        let current_foi = match producer.current_foi() {
            Some(foi) => self.register_foi(&system_id, &foi)?,
            None => ScopedId::NONE,
        };
        self.store_latest_records(producer, &outputs, &current_foi)?;

        path.push(uid.clone());
        let mut members = Vec::new();
        let mut newly_attached = Vec::new();
        for member in producer.members() {
            let member_uid = member.uid().to_string();
            let was_attached = self.state(&member_uid).is_some();
            match self.attach_tree(member.as_ref(), &system_id, depth + 1, path) {
                Ok(_) => {
                    if !was_attached {
                        newly_attached.push(member_uid.clone());
                    }
                    members.push(member_uid);
                }
                Err(e) => {
                    tracing::warn!(uid = %member_uid, group = %uid, error = %e, "failed to attach member");
                }
            }
        }
        path.pop();

        // Nothing is published before the registration is committed.
        if let Err(e) = self.inner.commits.record_write() {
            for member in &newly_attached {
                self.detach_tree(member, depth + 1);
            }
            return Err(e.into());
        }

        let (subscription, events) = self.inner.bus.subscribe(&uid);
        let outputs_count = outputs.len();
        let entry = Arc::new(Mutex::new(ProducerState {
            system_id: system_id.clone(),
            parent_id: parent_id.clone(),
            outputs,
            current_foi,
            members,
            subscription,
            detached: false,
        }));
        self.inner
            .producers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uid.clone(), entry.clone());
        self.spawn_event_worker(uid.clone(), entry, events);

        tracing::info!(uid = %uid, system_id = %system_id, outputs = outputs_count, depth, "attached producer");
        Ok(system_id)
    }

    /// Stores the record each output reports as its latest, unless the
    /// datastream already holds an observation at least as recent.
    fn store_latest_records(
        &self,
        producer: &dyn Producer,
        outputs: &HashMap<String, OutputState>,
        foi_id: &ScopedId,
    ) -> Result<(), IngestError> {
        for (name, output) in outputs {
            let Some((timestamp, record)) = producer.latest_record(name) else {
                continue;
            };
            let phenomenon_time = output.time.extract(&record).unwrap_or(timestamp);
            let stored = self
                .inner
                .db
                .obs_store()
                .latest_phenomenon_time(&output.datastream_id)?;
            if stored.is_some_and(|t| t >= phenomenon_time) {
                continue;
            }
            self.store_records(output, foi_id, timestamp, std::slice::from_ref(&record))?;
            tracing::debug!(uid = %producer.uid(), output = %name, "stored latest record");
        }
        Ok(())
    }

    fn store_records(
        &self,
        output: &OutputState,
        foi_id: &ScopedId,
        timestamp: DateTime<Utc>,
        records: &[Vec<DataValue>],
    ) -> Result<(), IngestError> {
        let obs_store = self.inner.db.obs_store();
        for record in records {
            obs_store.add(&Observation {
                datastream_id: output.datastream_id.clone(),
                foi_id: foi_id.clone(),
                phenomenon_time: output.time.extract(record).unwrap_or(timestamp),
                result_time: timestamp,
                result: record.clone(),
            })?;
        }
        Ok(())
    }

    /// Stores the live description unless an equal or newer version exists.
    fn register_system(&self, producer: &dyn Producer, parent_id: &ScopedId) -> Result<ScopedId, IngestError> {
        let store = self.inner.db.system_store();
        let mut desc = producer.description();
        desc.uid = producer.uid().to_string();
        desc.parent_id = parent_id.clone();

        let id = match store.latest_by_uid(&desc.uid)? {
            Some((id, stored)) if stored.valid_time.begin() >= desc.valid_time.begin() => id,
            Some(_) => {
                tracing::debug!(uid = %desc.uid, "storing newer system description");
                store.add(&desc)?
            }
            None => store.add(&desc)?,
        };
        Ok(id)
    }

    /// Finds or creates the datastream of every enabled output. A changed
    /// schema gets a new version.
    fn register_outputs(
        &self,
        producer: &dyn Producer,
        system_id: &ScopedId,
    ) -> Result<HashMap<String, OutputState>, IngestError> {
        let store = self.inner.db.datastream_store();
        let uid = producer.uid();
        let valid_from = producer.description().valid_time.begin();

        let mut outputs = HashMap::new();
        for output in producer.outputs().into_iter().filter(|o| o.enabled) {
            let existing = store.latest_for_output(uid, &output.name)?;
            let id = match existing {
                Some((id, stored)) if stored.record_schema == output.schema => id,
                previous => {
                    let (version, begin) = match &previous {
                        Some((_, stored)) => (stored.version + 1, Utc::now().max(stored.valid_time.begin())),
                        None => (1, valid_from),
                    };
                    let info = DataStreamInfo {
                        system_id: system_id.clone(),
                        system_uid: uid.to_string(),
                        output_name: output.name.clone(),
                        record_schema: output.schema.clone(),
                        record_encoding: output.recommended_encoding.clone(),
                        valid_time: TimeExtent::starting_at(begin),
                        version,
                    };
                    let id = store.add(&info)?;
                    tracing::info!(uid = %uid, output = %output.name, version, "registered datastream");
                    id
                }
            };
            outputs.insert(
                output.name.clone(),
                OutputState {
                    datastream_id: id,
                    time: TimeExtractor::for_schema(&output.schema),
                },
            );
        }
        Ok(outputs)
    }

    fn register_foi(&self, system_id: &ScopedId, foi: &Feature) -> Result<ScopedId, IngestError> {
        let store = self.inner.db.foi_store();
        match store.get_by_uid(&foi.uid)? {
            Some((id, _)) => Ok(id),
            None => Ok(store.add(system_id, foi)?),
        }
    }

    fn spawn_event_worker(
        &self,
        uid: String,
        entry: Arc<Mutex<ProducerState>>,
        mut events: UnboundedReceiver<ProducerEvent>,
    ) {
        let pipeline = self.clone();
        self.inner.runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let p = pipeline.clone();
                let e = entry.clone();
                let result = tokio::task::spawn_blocking(move || p.apply_event(&e, &event)).await;
                match result {
                    Ok(Ok(true)) => {}
                    Ok(Ok(false)) => {
                        tracing::debug!(uid = %uid, "producer detached, dropping queued events");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::error!(uid = %uid, error = %e, "failed to ingest event");
                    }
                    Err(e) => {
                        tracing::error!(uid = %uid, error = %e, "ingest worker panicked or was cancelled");
                    }
                }
            }
            tracing::debug!(uid = %uid, "event subscription closed");
        });
    }

    /// Applies one producer event to the store. Events of detached
    /// producers or unknown outputs are dropped. Blocks on store writes.
    ///
    /// # Errors
    ///
    /// Returns the store error; records written before it stay written.
    pub fn handle_event(&self, event: &ProducerEvent) -> Result<(), IngestError> {
        let uid = event.producer_uid();
        let Some(entry) = self.state(uid) else {
            tracing::debug!(uid = %uid, "dropping event of detached producer");
            return Ok(());
        };
        self.apply_event(&entry, event)?;
        Ok(())
    }

    /// Applies `event` to the producer owning `entry`. Returns false, and
    /// writes nothing, once that producer has been detached.
    fn apply_event(
        &self,
        entry: &Mutex<ProducerState>,
        event: &ProducerEvent,
    ) -> Result<bool, IngestError> {
        let uid = event.producer_uid();
        let mut state = lock(entry);
        if state.detached {
            return Ok(false);
        }

        match event {
            ProducerEvent::Data {
                output_name,
                timestamp,
                foi_uid,
                records,
                ..
            } => {
                let Some(output) = state.outputs.get(output_name).cloned() else {
                    tracing::debug!(uid = %uid, output = %output_name, "dropping event of unknown output");
                    return Ok(true);
                };
                let foi_id = match foi_uid {
                    Some(foi_uid) => self
                        .inner
                        .db
                        .foi_store()
                        .get_by_uid(foi_uid)?
                        .map_or_else(|| state.current_foi.clone(), |(id, _)| id),
                    None => state.current_foi.clone(),
                };
                self.store_records(&output, &foi_id, *timestamp, records)?;
                tracing::trace!(uid = %uid, output = %output_name, records = records.len(), "ingested records");
            }
            ProducerEvent::Foi { feature, .. } => {
                let system_id = state.system_id.clone();
                state.current_foi = self.register_foi(&system_id, feature)?;
                tracing::debug!(uid = %uid, foi = %feature.uid, "current feature of interest changed");
            }
            ProducerEvent::DescriptionChanged { description, .. } => {
                let mut desc = description.clone();
                desc.uid = uid.to_string();
                desc.parent_id = state.parent_id.clone();
                self.inner.db.system_store().add(&desc)?;
                tracing::debug!(uid = %uid, "stored new system description version");
            }
        }
        drop(state);

        self.inner.commits.record_write()?;
        Ok(true)
    }

    /// Detaches a producer and its members. Stored data is kept. Returns
    /// false if it was not attached.
    pub fn detach(&self, uid: &str) -> bool {
        let _membership = lock(&self.inner.membership);
        self.detach_tree(uid, 0)
    }

    fn detach_tree(&self, uid: &str, depth: usize) -> bool {
        let Some(entry) = self.state(uid) else {
            return false;
        };
        let members = lock(&entry).members.clone();
        if depth < MAX_MEMBER_DEPTH {
            for member in &members {
                self.detach_tree(member, depth + 1);
            }
        }

        let removed = self
            .inner
            .producers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(uid);
        if let Some(entry) = removed {
            let mut state = lock(&entry);
            state.detached = true;
            state.subscription.cancel();
            tracing::info!(uid = %uid, "detached producer");
        }
        true
    }

    /// Commits pending writes now. Blocks on the store.
    ///
    /// # Errors
    ///
    /// Returns the commit failure.
    pub fn commit_now(&self) -> Result<(), IngestError> {
        self.inner.commits.commit_now()?;
        Ok(())
    }

    /// Attaches the enabled producers of `registry`, follows its changes and
    /// starts the commit flush and auto-purge tasks.
    pub async fn start(&self, registry: Arc<ProducerRegistry>) {
        // Subscribe first so nothing registered meanwhile is missed.
        let changes = registry.subscribe();

        for producer in registry.enabled() {
            if !self.handles(producer.uid()) {
                continue;
            }
            self.attach_in_background(producer).await;
        }

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(run_registry_listener(self.clone(), registry, changes)));
        tasks.push(tokio::spawn(run_flush_task(self.inner.commits.clone())));
        if let Some(purge) = &self.inner.purge {
            tasks.push(tokio::spawn(run_purge_task(
                self.inner.db.clone(),
                self.inner.commits.clone(),
                purge.policy.clone(),
                self.inner.settings.handled_systems.clone(),
                purge.interval,
            )));
        }
        lock(&self.inner.tasks).extend(tasks);

        tracing::info!(attached = self.attached().len(), "ingestion pipeline started");
    }

    async fn attach_in_background(&self, producer: Arc<dyn Producer>) {
        let pipeline = self.clone();
        let uid = producer.uid().to_string();
        match tokio::task::spawn_blocking(move || pipeline.attach(producer)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::error!(uid = %uid, error = %e, "failed to attach producer");
            }
            Err(e) => {
                tracing::error!(uid = %uid, error = %e, "attach panicked or was cancelled");
            }
        }
    }

    /// Stops background tasks, detaches every producer and commits.
    ///
    /// # Errors
    ///
    /// Returns the final commit failure.
    pub async fn stop(&self) -> Result<(), IngestError> {
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }

        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || {
            for uid in pipeline.attached() {
                pipeline.detach(&uid);
            }
            pipeline.commit_now()
        })
        .await
        .map_err(|e| IngestError::Worker(e.to_string()))??;

        tracing::info!("ingestion pipeline stopped");
        Ok(())
    }
}

async fn run_registry_listener(
    pipeline: IngestPipeline,
    registry: Arc<ProducerRegistry>,
    mut changes: tokio::sync::broadcast::Receiver<RegistryEvent>,
) {
    loop {
        let event = match changes.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "registry listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            RegistryEvent::Added(uid) | RegistryEvent::Enabled(uid) => {
                if !pipeline.handles(&uid) {
                    continue;
                }
                if let Some(producer) = registry.get_enabled(&uid) {
                    pipeline.attach_in_background(producer).await;
                }
            }
            RegistryEvent::Removed(uid) | RegistryEvent::Disabled(uid) => {
                let p = pipeline.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || p.detach(&uid)).await {
                    tracing::error!(error = %e, "detach panicked or was cancelled");
                }
            }
        }
    }
    tracing::debug!("registry listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::OutputDescriptor;
    use chrono::TimeZone;
    use obshub_db::SqliteDatabase;
    use obshub_filter::ObsFilter;
    use obshub_types::{FieldKind, FieldSchema, RecordSchema, SystemDescription};

    struct Clock;

    impl Producer for Clock {
        fn uid(&self) -> &str {
            "urn:test:clock"
        }

        fn description(&self) -> SystemDescription {
            let epoch = Utc.timestamp_opt(0, 0).single().expect("valid timestamp");
            SystemDescription::new("urn:test:clock", "clock", epoch)
        }

        fn outputs(&self) -> Vec<OutputDescriptor> {
            vec![OutputDescriptor::new(
                "ticks",
                RecordSchema::new("ticks", vec![FieldSchema::new("time", "urn:def:time", FieldKind::Time)]),
            )]
        }
    }

    fn tick(secs: i64) -> ProducerEvent {
        let at = Utc.timestamp_opt(secs, 0).single().expect("valid timestamp");
        ProducerEvent::Data {
            producer_uid: "urn:test:clock".into(),
            output_name: "ticks".into(),
            timestamp: at,
            foi_uid: None,
            records: vec![vec![DataValue::Time(at)]],
        }
    }

    #[test]
    fn handled_system_patterns() {
        let patterns = vec!["urn:test:*".to_string(), "urn:exact".to_string()];
        assert!(matches_patterns(&patterns, "urn:test:sensor1"));
        assert!(matches_patterns(&patterns, "urn:exact"));
        assert!(!matches_patterns(&patterns, "urn:exact:2"));
        assert!(!matches_patterns(&patterns, "urn:other"));
        assert!(matches_patterns(&[], "anything"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queued_events_of_a_previous_attach_are_dropped() {
        let db: Arc<dyn ObsSystemDatabase> = Arc::new(SqliteDatabase::open_in_memory(1).expect("db"));
        let pipeline =
            IngestPipeline::new(db.clone(), EventBus::new(), IngestSettings::default(), None).expect("pipeline");

        pipeline.attach(Arc::new(Clock)).expect("attach");
        let previous = pipeline.state("urn:test:clock").expect("attached");
        assert!(pipeline.detach("urn:test:clock"));
        pipeline.attach(Arc::new(Clock)).expect("reattach");

        assert!(!pipeline.apply_event(&previous, &tick(10)).expect("stale apply"));
        assert_eq!(db.obs_store().count(&ObsFilter::default()).expect("count"), 0);

        let current = pipeline.state("urn:test:clock").expect("attached");
        assert!(pipeline.apply_event(&current, &tick(11)).expect("apply"));
        assert_eq!(db.obs_store().count(&ObsFilter::default()).expect("count"), 1);
    }
}
