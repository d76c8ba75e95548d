//! Store interfaces, one per resource collection.
//!
//! Every write is visible to later reads on the same database immediately
//! but only becomes durable after [`ObsSystemDatabase::commit`].

use chrono::{DateTime, Utc};
use obshub_filter::{DataStreamFilter, FoiFilter, ObsFilter, SystemFilter};
use obshub_id::ScopedId;
use obshub_types::{DataStreamInfo, Feature, Observation, SystemDescription};

use crate::error::StoreError;

/// Versioned system descriptions. All versions of a system share one id; a
/// version is keyed by the begin of its validity period.
pub trait SystemDescStore: Send + Sync {
    /// Adds `desc` as a new version of the system with the same unique id,
    /// creating the system if needed. A version with the same begin time is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownParent`] if `desc.parent_id` is neither
    /// NONE nor a stored system.
    fn add(&self, desc: &SystemDescription) -> Result<ScopedId, StoreError>;

    /// Replaces the version of system `id` that begins at
    /// `desc.valid_time.begin()`, adding it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is unknown and
    /// [`StoreError::InvalidData`] if `desc` has a different unique id.
    fn put(&self, id: &ScopedId, desc: &SystemDescription) -> Result<(), StoreError>;

    /// The current version of system `id`.
    fn get(&self, id: &ScopedId) -> Result<Option<SystemDescription>, StoreError>;

    /// The version of system `id` valid at `time`.
    fn get_at(
        &self,
        id: &ScopedId,
        time: DateTime<Utc>,
    ) -> Result<Option<SystemDescription>, StoreError>;

    /// The current version of the system with unique id `uid`.
    fn latest_by_uid(&self, uid: &str) -> Result<Option<(ScopedId, SystemDescription)>, StoreError>;

    /// Matching system versions. Without a validity constraint only current
    /// versions are returned.
    fn select(&self, filter: &SystemFilter) -> Result<Vec<(ScopedId, SystemDescription)>, StoreError>;

    /// Removes matching systems with all their versions, datastreams and
    /// observations. Returns the number of systems removed.
    fn remove(&self, filter: &SystemFilter) -> Result<usize, StoreError>;
}

/// Datastreams. Every schema version is a separate resource with its own id.
pub trait DataStreamStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownParent`] if `info.system_id` is not a
    /// stored system.
    fn add(&self, info: &DataStreamInfo) -> Result<ScopedId, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is unknown.
    fn put(&self, id: &ScopedId, info: &DataStreamInfo) -> Result<(), StoreError>;

    fn get(&self, id: &ScopedId) -> Result<Option<DataStreamInfo>, StoreError>;

    /// The highest version of the datastream fed by output `output_name` of
    /// the system with unique id `system_uid`.
    fn latest_for_output(
        &self,
        system_uid: &str,
        output_name: &str,
    ) -> Result<Option<(ScopedId, DataStreamInfo)>, StoreError>;

    fn select(&self, filter: &DataStreamFilter) -> Result<Vec<(ScopedId, DataStreamInfo)>, StoreError>;

    fn remove(&self, filter: &DataStreamFilter) -> Result<usize, StoreError>;
}

/// Features of interest, unique by uid.
pub trait FoiStore: Send + Sync {
    /// Adds a feature reported by system `parent_id`, which may be NONE.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownParent`] if `parent_id` is neither NONE
    /// nor a stored system.
    fn add(&self, parent_id: &ScopedId, feature: &Feature) -> Result<ScopedId, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is unknown.
    fn put(&self, id: &ScopedId, feature: &Feature) -> Result<(), StoreError>;

    fn get(&self, id: &ScopedId) -> Result<Option<Feature>, StoreError>;

    fn get_by_uid(&self, uid: &str) -> Result<Option<(ScopedId, Feature)>, StoreError>;

    fn select(&self, filter: &FoiFilter) -> Result<Vec<(ScopedId, Feature)>, StoreError>;

    fn remove(&self, filter: &FoiFilter) -> Result<usize, StoreError>;
}

/// Observations, ordered by datastream then phenomenon time.
pub trait ObsStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownParent`] if the datastream, or a
    /// feature of interest other than NONE, is not stored.
    fn add(&self, obs: &Observation) -> Result<ScopedId, StoreError>;

    fn get(&self, id: &ScopedId) -> Result<Option<Observation>, StoreError>;

    fn select(&self, filter: &ObsFilter) -> Result<Vec<(ScopedId, Observation)>, StoreError>;

    fn count(&self, filter: &ObsFilter) -> Result<u64, StoreError>;

    fn remove(&self, filter: &ObsFilter) -> Result<usize, StoreError>;

    /// Phenomenon time of the most recent observation of a datastream.
    fn latest_phenomenon_time(
        &self,
        datastream_id: &ScopedId,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// A database holding every collection the hub persists.
pub trait ObsSystemDatabase: Send + Sync {
    /// Scope of every id this database issues.
    fn database_num(&self) -> i32;

    fn system_store(&self) -> &dyn SystemDescStore;

    fn datastream_store(&self) -> &dyn DataStreamStore;

    fn foi_store(&self) -> &dyn FoiStore;

    fn obs_store(&self) -> &dyn ObsStore;

    /// Makes all writes so far durable.
    ///
    /// # Errors
    ///
    /// Returns the underlying error; writes already applied stay visible.
    fn commit(&self) -> Result<(), StoreError>;
}
