//! Error type for filter intersection.

/// The logical AND of two filters can match nothing.
///
/// This is not a fault: callers treat it as "zero results" and skip the
/// query entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("filter intersection is empty ({field})")]
pub struct EmptyIntersection {
    /// Name of the first field found to be disjoint.
    pub field: &'static str,
}

impl EmptyIntersection {
    pub(crate) fn on(field: &'static str) -> Self {
        Self { field }
    }
}
