//! Set and option helpers shared by every filter kind.

use std::collections::BTreeSet;

use crate::error::EmptyIntersection;

/// Matches any unique id.
pub const WILDCARD: &str = "*";

/// Filters that can be ANDed with another filter of the same kind.
pub trait Intersect: Sized {
    /// Returns a filter matching exactly what both `self` and `other` match.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyIntersection`] if no resource can satisfy both.
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection>;
}

/// Intersects two optional constraints; `None` is unconstrained.
pub(crate) fn intersect_opt<T: Intersect + Clone>(
    a: Option<&T>,
    b: Option<&T>,
) -> Result<Option<T>, EmptyIntersection> {
    match (a, b) {
        (Some(a), Some(b)) => a.intersect(b).map(Some),
        (Some(x), None) | (None, Some(x)) => Ok(Some(x.clone())),
        (None, None) => Ok(None),
    }
}

/// Same as [`intersect_opt`] for boxed linked filters.
pub(crate) fn intersect_linked<T: Intersect + Clone>(
    a: &Option<Box<T>>,
    b: &Option<Box<T>>,
) -> Result<Option<Box<T>>, EmptyIntersection> {
    Ok(intersect_opt(a.as_deref(), b.as_deref())?.map(Box::new))
}

/// Intersects two optional sets; `None` is unconstrained.
pub(crate) fn intersect_sets<T: Ord + Clone>(
    a: Option<&BTreeSet<T>>,
    b: Option<&BTreeSet<T>>,
    field: &'static str,
) -> Result<Option<BTreeSet<T>>, EmptyIntersection> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let both: BTreeSet<T> = a.intersection(b).cloned().collect();
            if both.is_empty() {
                return Err(EmptyIntersection::on(field));
            }
            Ok(Some(both))
        }
        (Some(x), None) | (None, Some(x)) => Ok(Some(x.clone())),
        (None, None) => Ok(None),
    }
}

/// Adds `items` to an optional set, creating it only if there is something
/// to add.
pub(crate) fn extend_set<T: Ord>(set: &mut Option<BTreeSet<T>>, items: impl IntoIterator<Item = T>) {
    let mut items = items.into_iter().peekable();
    if items.peek().is_some() {
        set.get_or_insert_with(BTreeSet::new).extend(items);
    }
}

/// Whether `uid` is selected by a set of unique ids that may contain
/// trailing-`*` prefixes.
pub(crate) fn matches_uid(patterns: &BTreeSet<String>, uid: &str) -> bool {
    patterns.iter().any(|p| match p.strip_suffix('*') {
        Some(prefix) => uid.starts_with(prefix),
        None => p == uid,
    })
}

/// Intersects two unique-id sets, honouring trailing-`*` prefixes.
///
/// An exact id survives if the other side selects it. Of two overlapping
/// prefixes the longer one survives. A side that is absent or holds the bare
/// wildcard is unconstrained, and the other side is returned unchanged.
pub(crate) fn intersect_uids(
    a: Option<&BTreeSet<String>>,
    b: Option<&BTreeSet<String>>,
) -> Result<Option<BTreeSet<String>>, EmptyIntersection> {
    let unconstrained = |s: Option<&BTreeSet<String>>| s.map_or(true, |s| s.contains(WILDCARD));
    let (a, b) = match (a, b) {
        _ if unconstrained(b) => return Ok(a.cloned()),
        _ if unconstrained(a) => return Ok(b.cloned()),
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(None),
    };

    let mut out = BTreeSet::new();
    for (this, that) in [(a, b), (b, a)] {
        for p in this {
            match p.strip_suffix('*') {
                None => {
                    if matches_uid(that, p) {
                        out.insert(p.clone());
                    }
                }
                Some(prefix) => {
                    // keep a prefix if it narrows one of the other side's prefixes
                    let narrows = that
                        .iter()
                        .filter_map(|q| q.strip_suffix('*'))
                        .any(|q| prefix.starts_with(q));
                    if narrows {
                        out.insert(p.clone());
                    }
                }
            }
        }
    }

    if out.is_empty() {
        return Err(EmptyIntersection::on("unique_ids"));
    }
    Ok(Some(out))
}
