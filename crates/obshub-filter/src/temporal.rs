//! Time predicates: fixed ranges, "now ± tolerance" and "latest".

use chrono::{DateTime, Duration, Utc};
use obshub_types::TimeExtent;
use serde::{Deserialize, Serialize};

use crate::error::EmptyIntersection;
use crate::sets::Intersect;

/// A constraint on a time stamp or a validity period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalFilter {
    /// Times within a closed range.
    Range { extent: TimeExtent },
    /// Times within `tolerance_ms` of the moment the filter is evaluated.
    CurrentTime { tolerance_ms: u64 },
    /// Only the most recent record of a series, or the current version of a
    /// versioned resource. Stores enforce this; the local test always passes.
    Latest,
}

impl TemporalFilter {
    pub fn range(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::Range {
            extent: TimeExtent::new(begin, end),
        }
    }

    pub fn instant(t: DateTime<Utc>) -> Self {
        Self::Range {
            extent: TimeExtent::instant(t),
        }
    }

    pub fn all_times() -> Self {
        Self::Range {
            extent: TimeExtent::all_times(),
        }
    }

    pub fn current_time(tolerance: Duration) -> Self {
        Self::CurrentTime {
            tolerance_ms: tolerance.num_milliseconds().unsigned_abs(),
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }

    pub fn is_current_time(&self) -> bool {
        matches!(self, Self::CurrentTime { .. })
    }

    pub fn is_all_times(&self) -> bool {
        matches!(self, Self::Range { extent } if extent.is_all_times())
    }

    /// The concrete range this filter selects if evaluated at `now`.
    ///
    /// `Latest` resolves to the single instant at the end of the time line.
    pub fn extent_at(&self, now: DateTime<Utc>) -> TimeExtent {
        match *self {
            Self::Range { extent } => extent,
            Self::CurrentTime { tolerance_ms } => {
                let tol = Duration::milliseconds(tolerance_ms.min(i64::MAX as u64) as i64);
                let begin = now.checked_sub_signed(tol).unwrap_or(DateTime::<Utc>::MIN_UTC);
                let end = now.checked_add_signed(tol).unwrap_or(DateTime::<Utc>::MAX_UTC);
                TimeExtent::new(begin, end)
            }
            Self::Latest => TimeExtent::instant(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// The concrete range this filter selects right now.
    pub fn extent(&self) -> TimeExtent {
        self.extent_at(Utc::now())
    }

    /// Whether the time stamp `t` passes.
    pub fn test(&self, t: DateTime<Utc>) -> bool {
        self.is_latest() || self.extent().contains(t)
    }

    /// Whether a validity period overlaps the selected range.
    pub fn test_extent(&self, te: &TimeExtent) -> bool {
        self.is_latest() || self.extent().intersects(te)
    }
}

impl Intersect for TemporalFilter {
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        use TemporalFilter::*;

        match (self, other) {
            (Latest, Latest) => return Ok(Latest),
            (Latest, o) | (o, Latest) if o.is_all_times() => return Ok(Latest),
            (CurrentTime { tolerance_ms: a }, CurrentTime { tolerance_ms: b }) => {
                return Ok(CurrentTime {
                    tolerance_ms: (*a).min(*b),
                });
            }
            (c @ CurrentTime { .. }, o) | (o, c @ CurrentTime { .. }) if o.is_all_times() => {
                return Ok(*c);
            }
            _ => {}
        }

        let now = Utc::now();
        let both = self
            .extent_at(now)
            .intersection(&other.extent_at(now))
            .ok_or(EmptyIntersection::on("time"))?;

        if self.is_latest() || other.is_latest() {
            // the only instant left is the end of the time line
            return Ok(Latest);
        }
        Ok(Range { extent: both })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn ranges_intersect_as_intervals() {
        let a = TemporalFilter::range(t(0), t(100));
        let b = TemporalFilter::range(t(50), t(150));
        assert_eq!(a.intersect(&b).expect("overlap"), TemporalFilter::range(t(50), t(100)));
    }

    #[test]
    fn disjoint_ranges_are_empty() {
        let a = TemporalFilter::range(t(0), t(10));
        let b = TemporalFilter::range(t(20), t(30));
        let err = a.intersect(&b).expect_err("disjoint");
        assert_eq!(err.field, "time");
    }

    #[test]
    fn latest_survives_all_times() {
        let all = TemporalFilter::all_times();
        assert_eq!(TemporalFilter::Latest.intersect(&all).expect("ok"), TemporalFilter::Latest);
        assert_eq!(all.intersect(&TemporalFilter::Latest).expect("ok"), TemporalFilter::Latest);
    }

    #[test]
    fn latest_with_open_ended_range_stays_latest() {
        let open = TemporalFilter::Range {
            extent: TimeExtent::starting_at(t(0)),
        };
        assert_eq!(open.intersect(&TemporalFilter::Latest).expect("ok"), TemporalFilter::Latest);
    }

    #[test]
    fn latest_with_closed_range_is_empty() {
        let closed = TemporalFilter::range(t(0), t(10));
        assert!(closed.intersect(&TemporalFilter::Latest).is_err());
    }

    #[test]
    fn current_time_keeps_smaller_tolerance() {
        let a = TemporalFilter::current_time(Duration::seconds(10));
        let b = TemporalFilter::current_time(Duration::seconds(2));
        assert_eq!(
            a.intersect(&b).expect("ok"),
            TemporalFilter::CurrentTime { tolerance_ms: 2000 }
        );
        assert_eq!(a.intersect(&TemporalFilter::all_times()).expect("ok"), a);
    }

    #[test]
    fn current_time_window_follows_now() {
        let f = TemporalFilter::current_time(Duration::seconds(5));
        let e = f.extent_at(t(1000));
        assert_eq!(e.begin(), t(995));
        assert_eq!(e.end(), t(1005));
        assert!(f.test(Utc::now()));
        assert!(!f.test(t(0)));
    }

    #[test]
    fn latest_always_passes_local_test() {
        assert!(TemporalFilter::Latest.test(t(0)));
        assert!(TemporalFilter::Latest.test_extent(&TimeExtent::instant(t(0))));
    }
}
