//! Filter on generic features (procedures, sampled features).

use serde::{Deserialize, Serialize};

use crate::base::{feature_filter_impls, FeatureFields};
use crate::error::EmptyIntersection;
use crate::sets::Intersect;

/// Selects features by internal id, unique id, keywords, validity and
/// location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFilter {
    feature: FeatureFields,
}

impl FeatureFilter {
    pub fn builder() -> FeatureFilterBuilder {
        FeatureFilterBuilder::default()
    }

    pub fn to_builder(&self) -> FeatureFilterBuilder {
        FeatureFilterBuilder::from(self)
    }
}

impl Intersect for FeatureFilter {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        Ok(Self {
            feature: self.feature.intersect(&other.feature)?,
        })
    }
}

/// Builder for [`FeatureFilter`].
#[derive(Debug, Clone, Default)]
pub struct FeatureFilterBuilder {
    inner: FeatureFilter,
}

impl FeatureFilterBuilder {
    pub fn build(self) -> FeatureFilter {
        self.inner
    }
}

impl From<&FeatureFilter> for FeatureFilterBuilder {
    fn from(filter: &FeatureFilter) -> Self {
        Self {
            inner: filter.clone(),
        }
    }
}

feature_filter_impls!(FeatureFilter, FeatureFilterBuilder);
