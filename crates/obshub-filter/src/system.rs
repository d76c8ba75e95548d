//! Filter on system descriptions.

use obshub_id::ScopedId;
use obshub_types::SystemDescription;
use serde::{Deserialize, Serialize};

use crate::base::{feature_filter_impls, FeatureFields, FeatureFilterBase, ResourceBuilder};
use crate::datastream::{DataStreamFilter, DataStreamFilterBuilder};
use crate::error::EmptyIntersection;
use crate::feature::{FeatureFilter, FeatureFilterBuilder};
use crate::sets::{intersect_linked, Intersect};

/// Selects systems by their own fields and by their parent system, their
/// datastreams and the procedure they implement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemFilter {
    feature: FeatureFields,
    parents: Option<Box<SystemFilter>>,
    datastreams: Option<Box<DataStreamFilter>>,
    procedures: Option<Box<FeatureFilter>>,
}

impl SystemFilter {
    pub fn builder() -> SystemFilterBuilder {
        SystemFilterBuilder::default()
    }

    pub fn to_builder(&self) -> SystemFilterBuilder {
        SystemFilterBuilder::from(self)
    }

    /// Parent systems the selected systems must belong to.
    pub fn parents(&self) -> Option<&SystemFilter> {
        self.parents.as_deref()
    }

    /// Datastreams the selected systems must have.
    pub fn datastreams(&self) -> Option<&DataStreamFilter> {
        self.datastreams.as_deref()
    }

    /// Procedures the selected systems must be instances of.
    pub fn procedures(&self) -> Option<&FeatureFilter> {
        self.procedures.as_deref()
    }

    /// Tests the non-linked fields against `system`.
    pub fn test(&self, system: &SystemDescription) -> bool {
        self.test_feature(system)
    }
}

impl Intersect for SystemFilter {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        Ok(Self {
            feature: self.feature.intersect(&other.feature)?,
            parents: intersect_linked(&self.parents, &other.parents)?,
            datastreams: intersect_linked(&self.datastreams, &other.datastreams)?,
            procedures: intersect_linked(&self.procedures, &other.procedures)?,
        })
    }
}

/// Builder for [`SystemFilter`].
#[derive(Debug, Clone, Default)]
pub struct SystemFilterBuilder {
    inner: SystemFilter,
}

impl SystemFilterBuilder {
    pub fn with_parents(mut self, parents: SystemFilter) -> Self {
        self.inner.parents = Some(Box::new(parents));
        self
    }

    /// Configures the parent filter in place.
    pub fn with_parents_matching(self, f: impl FnOnce(SystemFilterBuilder) -> SystemFilterBuilder) -> Self {
        self.with_parents(f(SystemFilter::builder()).build())
    }

    pub fn with_parent_ids(self, ids: impl IntoIterator<Item = ScopedId>) -> Self {
        self.with_parents_matching(|b| b.with_internal_ids(ids))
    }

    pub fn with_datastreams(mut self, datastreams: DataStreamFilter) -> Self {
        self.inner.datastreams = Some(Box::new(datastreams));
        self
    }

    pub fn with_datastreams_matching(
        self,
        f: impl FnOnce(DataStreamFilterBuilder) -> DataStreamFilterBuilder,
    ) -> Self {
        self.with_datastreams(f(DataStreamFilter::builder()).build())
    }

    pub fn with_procedures(mut self, procedures: FeatureFilter) -> Self {
        self.inner.procedures = Some(Box::new(procedures));
        self
    }

    pub fn with_procedures_matching(
        self,
        f: impl FnOnce(FeatureFilterBuilder) -> FeatureFilterBuilder,
    ) -> Self {
        self.with_procedures(f(FeatureFilter::builder()).build())
    }

    pub fn build(self) -> SystemFilter {
        self.inner
    }
}

impl From<&SystemFilter> for SystemFilterBuilder {
    fn from(filter: &SystemFilter) -> Self {
        Self {
            inner: filter.clone(),
        }
    }
}

feature_filter_impls!(SystemFilter, SystemFilterBuilder);
