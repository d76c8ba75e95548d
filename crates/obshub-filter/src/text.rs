//! Full-text keyword filter.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::EmptyIntersection;
use crate::sets::Intersect;

/// Keyword constraints in conjunctive normal form.
///
/// Each clause is a set of keywords of which at least one must occur; every
/// clause must be satisfied. A filter built from a single keyword list has
/// one clause. Matching is a case-insensitive substring search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFilter {
    clauses: Vec<BTreeSet<String>>,
}

impl TextFilter {
    /// Matches text containing any of `keywords`.
    ///
    /// Returns `None` if no non-blank keyword is given, since that would not
    /// constrain anything.
    pub fn any_of<I, S>(keywords: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let clause: BTreeSet<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if clause.is_empty() {
            return None;
        }
        Some(Self {
            clauses: vec![clause],
        })
    }

    pub fn clauses(&self) -> &[BTreeSet<String>] {
        &self.clauses
    }

    /// Whether every clause has a keyword occurring in one of `texts`.
    pub fn test<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> bool {
        let haystack: Vec<String> = texts.into_iter().map(str::to_lowercase).collect();
        self.clauses
            .iter()
            .all(|clause| clause.iter().any(|k| haystack.iter().any(|h| h.contains(k.as_str()))))
    }
}

impl Intersect for TextFilter {
    /// Keyword sets never provably conflict, so this always succeeds.
    fn intersect(&self, other: &Self) -> Result<Self, EmptyIntersection> {
        let mut clauses = self.clauses.clone();
        for clause in &other.clauses {
            if !clauses.contains(clause) {
                clauses.push(clause.clone());
            }
        }
        Ok(Self { clauses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_keywords_do_not_constrain() {
        assert!(TextFilter::any_of(["", "  "]).is_none());
    }

    #[test]
    fn any_keyword_matches_case_insensitively() {
        let f = TextFilter::any_of(["Weather", "wind"]).expect("keywords");
        assert!(f.test(["Rooftop WEATHER station"]));
        assert!(f.test(["nothing", "windy"]));
        assert!(!f.test(["thermometer"]));
    }

    #[test]
    fn intersection_requires_both_clauses() {
        let a = TextFilter::any_of(["weather"]).expect("keywords");
        let b = TextFilter::any_of(["roof", "mast"]).expect("keywords");
        let both = a.intersect(&b).expect("never empty");
        assert_eq!(both.clauses().len(), 2);
        assert!(both.test(["weather station on roof"]));
        assert!(!both.test(["weather station"]));
    }
}
