//! Fields common to all resource filters, and the builder traits that set
//! them.

use std::collections::BTreeSet;

use obshub_id::ScopedId;
use obshub_types::{Bbox, FeatureLike, Geometry, Resource, TimeExtent};
use serde::{Deserialize, Serialize};

use crate::error::EmptyIntersection;
use crate::sets::{extend_set, intersect_opt, intersect_sets, intersect_uids, matches_uid, Intersect, WILDCARD};
use crate::spatial::SpatialFilter;
use crate::temporal::TemporalFilter;
use crate::text::TextFilter;

/// Internal ids, keywords and paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceFields {
    internal_ids: Option<BTreeSet<ScopedId>>,
    keywords: Option<TextFilter>,
    limit: Option<u64>,
    skip: Option<u64>,
}

impl ResourceFields {
    pub fn test_internal_id(&self, id: &ScopedId) -> bool {
        self.internal_ids.as_ref().map_or(true, |ids| ids.contains(id))
    }

    pub fn test_keywords<R: Resource + ?Sized>(&self, resource: &R) -> bool {
        match &self.keywords {
            None => true,
            Some(k) => k.test(std::iter::once(resource.name()).chain(resource.description())),
        }
    }
}

impl Intersect for ResourceFields {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        Ok(Self {
            internal_ids: intersect_sets(
                self.internal_ids.as_ref(),
                other.internal_ids.as_ref(),
                "internal_ids",
            )?,
            keywords: intersect_opt(self.keywords.as_ref(), other.keywords.as_ref())?,
            limit: min_opt(self.limit, other.limit),
            skip: self.skip.max(other.skip),
        })
    }
}

pub(crate) fn min_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (x, None) | (None, x) => x,
    }
}

/// Unique ids, validity period, location and member inclusion, on top of
/// [`ResourceFields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFields {
    base: ResourceFields,
    unique_ids: Option<BTreeSet<String>>,
    valid_time: Option<TemporalFilter>,
    location: Option<SpatialFilter>,
    include_members: bool,
}

impl FeatureFields {
    pub fn test_unique_id(&self, uid: &str) -> bool {
        self.unique_ids.as_ref().map_or(true, |ids| matches_uid(ids, uid))
    }

    /// A resource without a validity period is valid at all times.
    pub fn test_valid_time(&self, valid_time: Option<&TimeExtent>) -> bool {
        match &self.valid_time {
            None => true,
            Some(f) => f.test_extent(valid_time.unwrap_or(&TimeExtent::all_times())),
        }
    }

    /// A resource without a location never matches a location constraint.
    pub fn test_location(&self, geometry: Option<&Geometry>) -> bool {
        match &self.location {
            None => true,
            Some(f) => geometry.is_some_and(|g| f.test(g)),
        }
    }

    /// Tests every local field except internal ids.
    pub fn test_feature<F: FeatureLike + ?Sized>(&self, feature: &F) -> bool {
        self.test_unique_id(feature.uid())
            && self.base.test_keywords(feature)
            && self.test_valid_time(feature.valid_time())
            && self.test_location(feature.geometry())
    }
}

impl Intersect for FeatureFields {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        Ok(Self {
            base: self.base.intersect(&other.base)?,
            unique_ids: intersect_uids(self.unique_ids.as_ref(), other.unique_ids.as_ref())?,
            valid_time: intersect_opt(self.valid_time.as_ref(), other.valid_time.as_ref())?,
            location: intersect_opt(self.location.as_ref(), other.location.as_ref())?,
            include_members: self.include_members || other.include_members,
        })
    }
}

/// Read access to [`ResourceFields`].
pub trait ResourceFilterBase {
    fn resource_fields(&self) -> &ResourceFields;

    /// Selected internal ids, `None` if unconstrained.
    fn internal_ids(&self) -> Option<&BTreeSet<ScopedId>> {
        self.resource_fields().internal_ids.as_ref()
    }

    fn keywords(&self) -> Option<&TextFilter> {
        self.resource_fields().keywords.as_ref()
    }

    fn limit(&self) -> Option<u64> {
        self.resource_fields().limit
    }

    fn skip(&self) -> u64 {
        self.resource_fields().skip.unwrap_or(0)
    }
}

/// Read access to [`FeatureFields`].
pub trait FeatureFilterBase: ResourceFilterBase {
    fn feature_fields(&self) -> &FeatureFields;

    /// Selected unique ids, `None` if unconstrained. Entries ending with `*`
    /// are prefixes.
    fn unique_ids(&self) -> Option<&BTreeSet<String>> {
        self.feature_fields()
            .unique_ids
            .as_ref()
            .filter(|ids| !ids.contains(WILDCARD))
    }

    fn valid_time(&self) -> Option<&TemporalFilter> {
        self.feature_fields().valid_time.as_ref()
    }

    fn location(&self) -> Option<&SpatialFilter> {
        self.feature_fields().location.as_ref()
    }

    /// Whether members of selected systems are selected as well.
    fn include_members(&self) -> bool {
        self.feature_fields().include_members
    }

    fn test_feature<F: FeatureLike + ?Sized>(&self, feature: &F) -> bool {
        self.feature_fields().test_feature(feature)
    }
}

/// Chainable setters for [`ResourceFields`].
pub trait ResourceBuilder: Sized {
    fn resource_fields_mut(&mut self) -> &mut ResourceFields;

    /// Keeps only resources with one of these internal ids. Repeated calls
    /// add to the set.
    fn with_internal_ids(mut self, ids: impl IntoIterator<Item = ScopedId>) -> Self {
        extend_set(&mut self.resource_fields_mut().internal_ids, ids);
        self
    }

    /// Keeps only resources whose name or description contains one of the
    /// keywords. Repeated calls must all be satisfied.
    fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(new) = TextFilter::any_of(keywords) {
            let fields = self.resource_fields_mut();
            fields.keywords = match fields.keywords.take() {
                // keyword intersection cannot fail
                Some(old) => Some(old.intersect(&new).unwrap_or(new)),
                None => Some(new),
            };
        }
        self
    }

    fn with_limit(mut self, limit: u64) -> Self {
        self.resource_fields_mut().limit = Some(limit);
        self
    }

    fn with_skip(mut self, skip: u64) -> Self {
        self.resource_fields_mut().skip = Some(skip);
        self
    }
}

/// Chainable setters for [`FeatureFields`].
pub trait FeatureBuilder: ResourceBuilder {
    fn feature_fields_mut(&mut self) -> &mut FeatureFields;

    /// Keeps only resources with one of these unique ids. An id ending with
    /// `*` selects every id with that prefix; a bare `*` selects all.
    fn with_unique_ids<I, S>(mut self, uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_set(
            &mut self.feature_fields_mut().unique_ids,
            uids.into_iter().map(Into::into),
        );
        self
    }

    fn with_valid_time(mut self, valid_time: TemporalFilter) -> Self {
        self.feature_fields_mut().valid_time = Some(valid_time);
        self
    }

    /// Keeps only the current version of each resource.
    fn with_current_version(self) -> Self {
        self.with_valid_time(TemporalFilter::Latest)
    }

    fn with_location(mut self, location: SpatialFilter) -> Self {
        self.feature_fields_mut().location = Some(location);
        self
    }

    fn with_location_within(self, roi: Bbox) -> Self {
        self.with_location(SpatialFilter::within(roi))
    }

    fn with_location_intersecting(self, roi: Bbox) -> Self {
        self.with_location(SpatialFilter::intersecting(roi))
    }

    fn include_members(mut self, include: bool) -> Self {
        self.feature_fields_mut().include_members = include;
        self
    }
}

/// Implements the field-access traits for a filter holding `FeatureFields`
/// in a field named `feature`, and for its builder holding the filter in
/// `inner`.
macro_rules! feature_filter_impls {
    ($filter:ty, $builder:ty) => {
        impl $crate::base::ResourceFilterBase for $filter {
            fn resource_fields(&self) -> &$crate::base::ResourceFields {
                self.feature.resource_fields()
            }
        }

        impl $crate::base::FeatureFilterBase for $filter {
            fn feature_fields(&self) -> &$crate::base::FeatureFields {
                &self.feature
            }
        }

        impl $crate::base::ResourceBuilder for $builder {
            fn resource_fields_mut(&mut self) -> &mut $crate::base::ResourceFields {
                self.inner.feature.resource_fields_mut()
            }
        }

        impl $crate::base::FeatureBuilder for $builder {
            fn feature_fields_mut(&mut self) -> &mut $crate::base::FeatureFields {
                &mut self.inner.feature
            }
        }
    };
}

pub(crate) use feature_filter_impls;

impl FeatureFields {
    pub(crate) fn resource_fields(&self) -> &ResourceFields {
        &self.base
    }

    pub(crate) fn resource_fields_mut(&mut self) -> &mut ResourceFields {
        &mut self.base
    }
}
