//! Filter on observations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use obshub_id::ScopedId;
use obshub_types::{Bbox, Observation};
use serde::{Deserialize, Serialize};

use crate::base::{min_opt, ResourceBuilder};
use crate::datastream::{DataStreamFilter, DataStreamFilterBuilder};
use crate::error::EmptyIntersection;
use crate::foi::{FoiFilter, FoiFilterBuilder};
use crate::sets::{extend_set, intersect_linked, intersect_opt, intersect_sets, Intersect};
use crate::spatial::SpatialFilter;
use crate::temporal::TemporalFilter;

/// Selects observations by id, phenomenon and result time, location of their
/// feature of interest, and by their datastream and feature of interest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObsFilter {
    internal_ids: Option<BTreeSet<ScopedId>>,
    phenomenon_time: Option<TemporalFilter>,
    result_time: Option<TemporalFilter>,
    phenomenon_location: Option<SpatialFilter>,
    datastreams: Option<Box<DataStreamFilter>>,
    fois: Option<Box<FoiFilter>>,
    limit: Option<u64>,
    skip: Option<u64>,
}

impl ObsFilter {
    pub fn builder() -> ObsFilterBuilder {
        ObsFilterBuilder::default()
    }

    pub fn to_builder(&self) -> ObsFilterBuilder {
        ObsFilterBuilder::from(self)
    }

    pub fn internal_ids(&self) -> Option<&BTreeSet<ScopedId>> {
        self.internal_ids.as_ref()
    }

    /// `Latest` selects the most recent observation of each datastream.
    pub fn phenomenon_time(&self) -> Option<&TemporalFilter> {
        self.phenomenon_time.as_ref()
    }

    pub fn result_time(&self) -> Option<&TemporalFilter> {
        self.result_time.as_ref()
    }

    /// Region the observation's feature of interest must be located in.
    pub fn phenomenon_location(&self) -> Option<&SpatialFilter> {
        self.phenomenon_location.as_ref()
    }

    pub fn datastreams(&self) -> Option<&DataStreamFilter> {
        self.datastreams.as_deref()
    }

    pub fn fois(&self) -> Option<&FoiFilter> {
        self.fois.as_deref()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn skip(&self) -> u64 {
        self.skip.unwrap_or(0)
    }

    pub fn test_internal_id(&self, id: &ScopedId) -> bool {
        self.internal_ids.as_ref().map_or(true, |ids| ids.contains(id))
    }

    pub fn test_phenomenon_time(&self, t: DateTime<Utc>) -> bool {
        self.phenomenon_time.as_ref().map_or(true, |f| f.test(t))
    }

    pub fn test_result_time(&self, t: DateTime<Utc>) -> bool {
        self.result_time.as_ref().map_or(true, |f| f.test(t))
    }

    /// Tests the time fields against `obs`.
    pub fn test(&self, obs: &Observation) -> bool {
        self.test_phenomenon_time(obs.phenomenon_time) && self.test_result_time(obs.result_time)
    }
}

impl Intersect for ObsFilter {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        Ok(Self {
            internal_ids: intersect_sets(
                self.internal_ids.as_ref(),
                other.internal_ids.as_ref(),
                "internal_ids",
            )?,
            phenomenon_time: intersect_opt(
                self.phenomenon_time.as_ref(),
                other.phenomenon_time.as_ref(),
            )?,
            result_time: intersect_opt(self.result_time.as_ref(), other.result_time.as_ref())?,
            phenomenon_location: intersect_opt(
                self.phenomenon_location.as_ref(),
                other.phenomenon_location.as_ref(),
            )?,
            datastreams: intersect_linked(&self.datastreams, &other.datastreams)?,
            fois: intersect_linked(&self.fois, &other.fois)?,
            limit: min_opt(self.limit, other.limit),
            skip: self.skip.max(other.skip),
        })
    }
}

/// Builder for [`ObsFilter`].
#[derive(Debug, Clone, Default)]
pub struct ObsFilterBuilder {
    inner: ObsFilter,
}

impl ObsFilterBuilder {
    pub fn with_internal_ids(mut self, ids: impl IntoIterator<Item = ScopedId>) -> Self {
        extend_set(&mut self.inner.internal_ids, ids);
        self
    }

    pub fn with_phenomenon_time(mut self, time: TemporalFilter) -> Self {
        self.inner.phenomenon_time = Some(time);
        self
    }

    pub fn with_phenomenon_time_during(self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.with_phenomenon_time(TemporalFilter::range(begin, end))
    }

    /// Keeps only the most recent observation of each datastream.
    pub fn with_latest_result(self) -> Self {
        self.with_phenomenon_time(TemporalFilter::Latest)
    }

    pub fn with_result_time(mut self, time: TemporalFilter) -> Self {
        self.inner.result_time = Some(time);
        self
    }

    pub fn with_phenomenon_location(mut self, location: SpatialFilter) -> Self {
        self.inner.phenomenon_location = Some(location);
        self
    }

    pub fn with_phenomenon_location_within(self, roi: Bbox) -> Self {
        self.with_phenomenon_location(SpatialFilter::within(roi))
    }

    pub fn with_datastreams(mut self, datastreams: DataStreamFilter) -> Self {
        self.inner.datastreams = Some(Box::new(datastreams));
        self
    }

    /// Configures the datastream filter in place.
    pub fn with_datastreams_matching(
        self,
        f: impl FnOnce(DataStreamFilterBuilder) -> DataStreamFilterBuilder,
    ) -> Self {
        self.with_datastreams(f(DataStreamFilter::builder()).build())
    }

    pub fn with_datastream_ids(self, ids: impl IntoIterator<Item = ScopedId>) -> Self {
        self.with_datastreams_matching(|b| b.with_internal_ids(ids))
    }

    pub fn with_fois(mut self, fois: FoiFilter) -> Self {
        self.inner.fois = Some(Box::new(fois));
        self
    }

    pub fn with_fois_matching(self, f: impl FnOnce(FoiFilterBuilder) -> FoiFilterBuilder) -> Self {
        self.with_fois(f(FoiFilter::builder()).build())
    }

    pub fn with_foi_ids(self, ids: impl IntoIterator<Item = ScopedId>) -> Self {
        self.with_fois_matching(|b| b.with_internal_ids(ids))
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.inner.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.inner.skip = Some(skip);
        self
    }

    pub fn build(self) -> ObsFilter {
        self.inner
    }
}

impl From<&ObsFilter> for ObsFilterBuilder {
    fn from(filter: &ObsFilter) -> Self {
        Self {
            inner: filter.clone(),
        }
    }
}
