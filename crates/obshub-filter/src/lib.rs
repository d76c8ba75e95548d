//! Composable, immutable query filters over stored resources.
//!
//! A filter is a tree of constraints: each field constrains one dimension
//! of a resource (multi-valued fields are an OR across their members), and
//! linked filters constrain related resources, e.g. "observations whose
//! datastream belongs to a system whose uid starts with `urn:osh:`". Absent
//! fields are unconstrained.
//!
//! Filters are built once through a builder and never mutated. Two filters
//! of the same kind can be combined with [`Intersect::intersect`], which
//! fails with [`EmptyIntersection`] when the combination provably matches
//! nothing; callers treat that as an empty result without querying.
//!
//! ```rust,ignore
//! use obshub_filter::prelude::*;
//!
//! let filter = ObsFilter::builder()
//!     .with_datastreams_matching(|ds| {
//!         ds.with_output_names(["weather"])
//!             .with_systems_matching(|sys| sys.with_unique_ids(["urn:osh:sensor:*"]))
//!     })
//!     .with_latest_result()
//!     .build();
//! ```

mod base;
mod datastream;
mod error;
mod feature;
mod foi;
mod obs;
mod sets;
mod spatial;
mod system;
mod temporal;
mod text;

pub use base::{
    FeatureBuilder, FeatureFields, FeatureFilterBase, ResourceBuilder, ResourceFields,
    ResourceFilterBase,
};
pub use datastream::{DataStreamFilter, DataStreamFilterBuilder};
pub use error::EmptyIntersection;
pub use feature::{FeatureFilter, FeatureFilterBuilder};
pub use foi::{FoiFilter, FoiFilterBuilder};
pub use obs::{ObsFilter, ObsFilterBuilder};
pub use sets::{Intersect, WILDCARD};
pub use spatial::{SpatialFilter, SpatialOp};
pub use system::{SystemFilter, SystemFilterBuilder};
pub use temporal::TemporalFilter;
pub use text::TextFilter;

/// Filter types together with the traits their builders and accessors need.
pub mod prelude {
    pub use crate::{
        DataStreamFilter, EmptyIntersection, FeatureBuilder, FeatureFilter, FeatureFilterBase,
        FoiFilter, Intersect, ObsFilter, ResourceBuilder, ResourceFilterBase, SpatialFilter,
        SystemFilter, TemporalFilter,
    };
}
