//! Filter on datastreams.

use std::collections::BTreeSet;

use obshub_id::ScopedId;
use obshub_types::DataStreamInfo;
use serde::{Deserialize, Serialize};

use crate::base::{ResourceBuilder, ResourceFields, ResourceFilterBase};
use crate::error::EmptyIntersection;
use crate::obs::{ObsFilter, ObsFilterBuilder};
use crate::sets::{extend_set, intersect_linked, intersect_opt, intersect_sets, Intersect};
use crate::system::{SystemFilter, SystemFilterBuilder};
use crate::temporal::TemporalFilter;

/// Selects datastreams by output name, observed property and validity, and
/// by the systems and observations linked to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStreamFilter {
    base: ResourceFields,
    systems: Option<Box<SystemFilter>>,
    observations: Option<Box<ObsFilter>>,
    output_names: Option<BTreeSet<String>>,
    observed_properties: Option<BTreeSet<String>>,
    valid_time: Option<TemporalFilter>,
}

impl DataStreamFilter {
    pub fn builder() -> DataStreamFilterBuilder {
        DataStreamFilterBuilder::default()
    }

    pub fn to_builder(&self) -> DataStreamFilterBuilder {
        DataStreamFilterBuilder::from(self)
    }

    pub fn systems(&self) -> Option<&SystemFilter> {
        self.systems.as_deref()
    }

    pub fn observations(&self) -> Option<&ObsFilter> {
        self.observations.as_deref()
    }

    pub fn output_names(&self) -> Option<&BTreeSet<String>> {
        self.output_names.as_ref()
    }

    /// Definition URIs of which the datastream must carry at least one.
    pub fn observed_properties(&self) -> Option<&BTreeSet<String>> {
        self.observed_properties.as_ref()
    }

    pub fn valid_time(&self) -> Option<&TemporalFilter> {
        self.valid_time.as_ref()
    }

    pub fn test_output_name(&self, name: &str) -> bool {
        self.output_names.as_ref().map_or(true, |n| n.contains(name))
    }

    pub fn test_observed_properties(&self, ds: &DataStreamInfo) -> bool {
        match &self.observed_properties {
            None => true,
            Some(props) => ds.record_schema.observed_properties().any(|p| props.contains(p)),
        }
    }

    /// Tests the non-linked fields against `ds`. `Latest` validity is left
    /// to the store.
    pub fn test(&self, ds: &DataStreamInfo) -> bool {
        self.test_output_name(&ds.output_name)
            && self.test_observed_properties(ds)
            && self.base.test_keywords(ds)
            && self.valid_time.as_ref().map_or(true, |t| t.test_extent(&ds.valid_time))
    }
}

impl Intersect for DataStreamFilter {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        Ok(Self {
            base: self.base.intersect(&other.base)?,
            systems: intersect_linked(&self.systems, &other.systems)?,
            observations: intersect_linked(&self.observations, &other.observations)?,
            output_names: intersect_sets(
                self.output_names.as_ref(),
                other.output_names.as_ref(),
                "output_names",
            )?,
            observed_properties: intersect_sets(
                self.observed_properties.as_ref(),
                other.observed_properties.as_ref(),
                "observed_properties",
            )?,
            valid_time: intersect_opt(self.valid_time.as_ref(), other.valid_time.as_ref())?,
        })
    }
}

impl ResourceFilterBase for DataStreamFilter {
    fn resource_fields(&self) -> &ResourceFields {
        &self.base
    }
}

/// Builder for [`DataStreamFilter`].
#[derive(Debug, Clone, Default)]
pub struct DataStreamFilterBuilder {
    inner: DataStreamFilter,
}

impl DataStreamFilterBuilder {
    pub fn with_systems(mut self, systems: SystemFilter) -> Self {
        self.inner.systems = Some(Box::new(systems));
        self
    }

    /// Configures the system filter in place.
    pub fn with_systems_matching(
        self,
        f: impl FnOnce(SystemFilterBuilder) -> SystemFilterBuilder,
    ) -> Self {
        self.with_systems(f(SystemFilter::builder()).build())
    }

    pub fn with_system_ids(self, ids: impl IntoIterator<Item = ScopedId>) -> Self {
        self.with_systems_matching(|b| b.with_internal_ids(ids))
    }

    pub fn with_observations(mut self, observations: ObsFilter) -> Self {
        self.inner.observations = Some(Box::new(observations));
        self
    }

    pub fn with_observations_matching(
        self,
        f: impl FnOnce(ObsFilterBuilder) -> ObsFilterBuilder,
    ) -> Self {
        self.with_observations(f(ObsFilter::builder()).build())
    }

    pub fn with_output_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_set(&mut self.inner.output_names, names.into_iter().map(Into::into));
        self
    }

    pub fn with_observed_properties<I, S>(mut self, definitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_set(
            &mut self.inner.observed_properties,
            definitions.into_iter().map(Into::into),
        );
        self
    }

    pub fn with_valid_time(mut self, valid_time: TemporalFilter) -> Self {
        self.inner.valid_time = Some(valid_time);
        self
    }

    /// Keeps only the current version of each datastream.
    pub fn with_current_version(self) -> Self {
        self.with_valid_time(TemporalFilter::Latest)
    }

    pub fn build(self) -> DataStreamFilter {
        self.inner
    }
}

impl ResourceBuilder for DataStreamFilterBuilder {
    fn resource_fields_mut(&mut self) -> &mut ResourceFields {
        &mut self.inner.base
    }
}

impl From<&DataStreamFilter> for DataStreamFilterBuilder {
    fn from(filter: &DataStreamFilter) -> Self {
        Self {
            inner: filter.clone(),
        }
    }
}
