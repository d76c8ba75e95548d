//! Planar geometry values used for feature locations and spatial filters.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    /// Creates a box from two opposite corners in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &Bbox) -> bool {
        self.min_x <= other.min_x
            && other.max_x <= self.max_x
            && self.min_y <= other.min_y
            && other.max_y <= self.max_y
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// The overlapping region, or `None` if the boxes are disjoint.
    pub fn intersection(&self, other: &Bbox) -> Option<Bbox> {
        if !self.intersects(other) {
            return None;
        }
        Some(Bbox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }
}

/// A feature location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Point { x: f64, y: f64 },
    Bbox(Bbox),
}

impl Geometry {
    /// The smallest box enclosing the geometry.
    pub fn bbox(&self) -> Bbox {
        match *self {
            Geometry::Point { x, y } => Bbox::new(x, y, x, y),
            Geometry::Bbox(b) => b,
        }
    }
}
