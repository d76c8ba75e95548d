//! Filter on features of interest.

use obshub_id::ScopedId;
use obshub_types::Feature;
use serde::{Deserialize, Serialize};

use crate::base::{feature_filter_impls, FeatureFields, FeatureFilterBase, ResourceBuilder};
use crate::error::EmptyIntersection;
use crate::feature::{FeatureFilter, FeatureFilterBuilder};
use crate::obs::{ObsFilter, ObsFilterBuilder};
use crate::sets::{intersect_linked, Intersect};
use crate::system::{SystemFilter, SystemFilterBuilder};

/// Selects features of interest by their own fields, the systems that
/// observed them, the feature they sample and their observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoiFilter {
    feature: FeatureFields,
    parents: Option<Box<SystemFilter>>,
    sampled_features: Option<Box<FeatureFilter>>,
    observations: Option<Box<ObsFilter>>,
}

impl FoiFilter {
    pub fn builder() -> FoiFilterBuilder {
        FoiFilterBuilder::default()
    }

    pub fn to_builder(&self) -> FoiFilterBuilder {
        FoiFilterBuilder::from(self)
    }

    pub fn parents(&self) -> Option<&SystemFilter> {
        self.parents.as_deref()
    }

    pub fn sampled_features(&self) -> Option<&FeatureFilter> {
        self.sampled_features.as_deref()
    }

    pub fn observations(&self) -> Option<&ObsFilter> {
        self.observations.as_deref()
    }

    pub fn test(&self, foi: &Feature) -> bool {
        self.test_feature(foi)
    }
}

impl Intersect for FoiFilter {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        Ok(Self {
            feature: self.feature.intersect(&other.feature)?,
            parents: intersect_linked(&self.parents, &other.parents)?,
            sampled_features: intersect_linked(&self.sampled_features, &other.sampled_features)?,
            observations: intersect_linked(&self.observations, &other.observations)?,
        })
    }
}

/// Builder for [`FoiFilter`].
#[derive(Debug, Clone, Default)]
pub struct FoiFilterBuilder {
    inner: FoiFilter,
}

impl FoiFilterBuilder {
    pub fn with_parents(mut self, parents: SystemFilter) -> Self {
        self.inner.parents = Some(Box::new(parents));
        self
    }

    pub fn with_parents_matching(
        self,
        f: impl FnOnce(SystemFilterBuilder) -> SystemFilterBuilder,
    ) -> Self {
        self.with_parents(f(SystemFilter::builder()).build())
    }

    pub fn with_parent_ids(self, ids: impl IntoIterator<Item = ScopedId>) -> Self {
        self.with_parents_matching(|b| b.with_internal_ids(ids))
    }

    pub fn with_sampled_features(mut self, features: FeatureFilter) -> Self {
        self.inner.sampled_features = Some(Box::new(features));
        self
    }

    pub fn with_sampled_features_matching(
        self,
        f: impl FnOnce(FeatureFilterBuilder) -> FeatureFilterBuilder,
    ) -> Self {
        self.with_sampled_features(f(FeatureFilter::builder()).build())
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

    pub fn build(self) -> FoiFilter {
        self.inner
    }
}

impl From<&FoiFilter> for FoiFilterBuilder {
    fn from(filter: &FoiFilter) -> Self {
        Self {
            inner: filter.clone(),
        }
    }
}

feature_filter_impls!(FoiFilter, FoiFilterBuilder);
