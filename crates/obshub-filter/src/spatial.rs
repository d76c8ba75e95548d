//! Region-of-interest predicates.

use obshub_types::{Bbox, Geometry};
use serde::{Deserialize, Serialize};

use crate::error::EmptyIntersection;
use crate::sets::Intersect;

/// How a geometry is compared to the region of interest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialOp {
    #[default]
    Intersects,
    Within,
}

/// Selects geometries relative to a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
    roi: Bbox,
    op: SpatialOp,
}

impl SpatialFilter {
    /// Geometries touching `roi`.
    pub fn intersecting(roi: Bbox) -> Self {
        Self {
            roi,
            op: SpatialOp::Intersects,
        }
    }

    /// Geometries entirely inside `roi`.
    pub fn within(roi: Bbox) -> Self {
        Self {
            roi,
            op: SpatialOp::Within,
        }
    }

    pub fn roi(&self) -> &Bbox {
        &self.roi
    }

    pub fn op(&self) -> SpatialOp {
        self.op
    }

    pub fn test(&self, geometry: &Geometry) -> bool {
        let bbox = geometry.bbox();
        match self.op {
            SpatialOp::Intersects => self.roi.intersects(&bbox),
            SpatialOp::Within => self.roi.contains(&bbox),
        }
    }
}

impl Intersect for SpatialFilter {
    /// The result covers the overlap of both regions and uses the stricter
    /// operator.
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        let roi = self
            .roi
            .intersection(&other.roi)
            .ok_or(EmptyIntersection::on("location"))?;
        let op = if self.op == SpatialOp::Within || other.op == SpatialOp::Within {
            SpatialOp::Within
        } else {
            SpatialOp::Intersects
        };
        Ok(Self { roi, op })
    }
}
