//! Closed time intervals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed interval `[begin, end]` in UTC.
///
/// Unbounded sides are represented by [`DateTime::<Utc>::MIN_UTC`] and
/// [`DateTime::<Utc>::MAX_UTC`]. An extent with `begin == end` is a time
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeExtent {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeExtent {
    /// Creates an extent spanning both instants, in whichever order they
    /// were given.
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        Self {
            begin: a.min(b),
            end: a.max(b),
        }
    }

    /// A single instant.
    pub fn instant(t: DateTime<Utc>) -> Self {
        Self { begin: t, end: t }
    }

    /// The whole time line.
    pub fn all_times() -> Self {
        Self {
            begin: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Everything from `t` onwards.
    pub fn starting_at(t: DateTime<Utc>) -> Self {
        Self {
            begin: t,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Everything up to and including `t`.
    pub fn ending_at(t: DateTime<Utc>) -> Self {
        Self {
            begin: DateTime::<Utc>::MIN_UTC,
            end: t,
        }
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_instant(&self) -> bool {
        self.begin == self.end
    }

    pub fn is_all_times(&self) -> bool {
        self.begin == DateTime::<Utc>::MIN_UTC && self.end == DateTime::<Utc>::MAX_UTC
    }

    pub fn has_open_end(&self) -> bool {
        self.end == DateTime::<Utc>::MAX_UTC
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.begin <= t && t <= self.end
    }

    /// Whether `other` lies entirely inside this extent.
    pub fn contains_extent(&self, other: &TimeExtent) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    pub fn intersects(&self, other: &TimeExtent) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }

    /// The overlap of two extents, or `None` if they are disjoint.
    pub fn intersection(&self, other: &TimeExtent) -> Option<TimeExtent> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self {
            begin: self.begin.max(other.begin),
            end: self.end.min(other.end),
        })
    }
}
