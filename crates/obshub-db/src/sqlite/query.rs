//! Dynamic WHERE clause assembly shared by the table modules.

use std::collections::BTreeSet;

use rusqlite::types::ToSql;
use rusqlite::Connection;

use crate::error::StoreError;

/// Collected WHERE conditions and their positional parameters.
#[derive(Default)]
pub(crate) struct Clauses {
    conditions: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Clauses {
    /// Binds `value` and returns its placeholder.
    pub(crate) fn param(&mut self, value: impl ToSql + 'static) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }

    pub(crate) fn add(&mut self, condition: impl Into<String>) {
        self.conditions.push(condition.into());
    }

    pub(crate) fn add_in<'a>(&mut self, column: &str, ids: impl IntoIterator<Item = &'a i64>) {
        self.add(in_list(column, ids));
    }

    pub(crate) fn add_text_in(&mut self, column: &str, values: &BTreeSet<String>) {
        let placeholders: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
        self.add(format!("{column} IN ({})", placeholders.join(", ")));
    }

    /// Matches exact unique ids and `prefix*` patterns. Comparison is case
    /// sensitive, so LIKE is not used.
    pub(crate) fn add_uids(&mut self, column: &str, uids: &BTreeSet<String>) {
        let mut alternatives = Vec::with_capacity(uids.len());
        for uid in uids {
            match uid.strip_suffix('*') {
                Some(prefix) => {
                    let len = prefix.chars().count();
                    let p = self.param(prefix.to_string());
                    alternatives.push(format!("substr({column}, 1, {len}) = {p}"));
                }
                None => {
                    let p = self.param(uid.clone());
                    alternatives.push(format!("{column} = {p}"));
                }
            }
        }
        self.add(format!("({})", alternatives.join(" OR ")));
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub(crate) fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| &**p).collect()
    }
}

/// `column IN (1, 2, 3)`. Row ids are integers, so they are inlined rather
/// than bound to stay clear of the parameter limit.
pub(crate) fn in_list<'a>(column: &str, ids: impl IntoIterator<Item = &'a i64>) -> String {
    let list: Vec<String> = ids.into_iter().map(i64::to_string).collect();
    format!("{column} IN ({})", list.join(", "))
}

/// Applies skip and limit to rows already filtered in memory.
pub(crate) fn page<T>(rows: Vec<T>, skip: u64, limit: Option<u64>) -> Vec<T> {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(limit).collect()
}

/// SQL `LIMIT .. OFFSET ..` suffix; a negative limit means no limit.
pub(crate) fn limit_sql(skip: u64, limit: Option<u64>) -> String {
    let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    let skip = i64::try_from(skip).unwrap_or(i64::MAX);
    format!(" LIMIT {limit} OFFSET {skip}")
}

pub(crate) fn delete_ids(
    conn: &Connection,
    table: &str,
    ids: &BTreeSet<i64>,
) -> Result<usize, StoreError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let removed = conn.execute(&format!("DELETE FROM {table} WHERE {}", in_list("id", ids)), [])?;
    Ok(removed)
}
