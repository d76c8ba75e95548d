//! Value types shared across the obshub crates.
//!
//! This crate holds the stored resource records (system descriptions,
//! datastreams, features of interest, observations), the record schemas
//! datastreams are described with, and the time and geometry values that
//! filters constrain. It has no behaviour beyond small value helpers, so the
//! filter, store and ingestion crates can all depend on it without cycles.

mod geom;
mod resource;
mod schema;
mod time;

pub use geom::{Bbox, Geometry};
pub use resource::{DataStreamInfo, Feature, FeatureLike, Observation, Resource, SystemDescription};
pub use schema::{DataValue, FieldKind, FieldSchema, RecordEncoding, RecordSchema, TimeExtractor};
pub use time::TimeExtent;
