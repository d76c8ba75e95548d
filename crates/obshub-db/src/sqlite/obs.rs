use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use obshub_filter::prelude::*;
use obshub_id::ScopedId;
use obshub_types::{DataValue, Observation};
use rusqlite::{params, Connection};

use super::query::{in_list, limit_sql, Clauses};
use super::{datastreams, fois, from_millis, row_id, row_ids, scoped_id, to_millis, Inner};
use crate::error::StoreError;
use crate::store::ObsStore;

pub(crate) struct SqliteObsStore(pub(crate) Arc<Inner>);

const OBS_COLUMNS: &str =
    "o.id, o.datastream_id, o.foi_id, o.phenomenon_time, o.result_time, o.result_json";

const OBS_ORDER: &str = " ORDER BY o.datastream_id, o.phenomenon_time, o.id";

fn time_clause(q: &mut Clauses, column: &str, filter: &TemporalFilter) {
    if filter.is_latest() {
        q.add(format!(
            "o.{column} = (SELECT MAX(l.{column}) FROM observations l WHERE l.datastream_id = o.datastream_id)"
        ));
    } else {
        let extent = filter.extent();
        let begin = q.param(to_millis(extent.begin()));
        let end = q.param(to_millis(extent.end()));
        q.add(format!("o.{column} BETWEEN {begin} AND {end}"));
    }
}

/// WHERE clauses for `filter`, or `None` if a linked filter matches
/// nothing. Paging is not included.
fn clauses(conn: &Connection, database_num: i32, filter: &ObsFilter) -> Result<Option<Clauses>, StoreError> {
    let mut q = Clauses::default();

    if let Some(ids) = filter.internal_ids() {
        let ids = row_ids(database_num, ids);
        if ids.is_empty() {
            return Ok(None);
        }
        q.add_in("o.id", &ids);
    }

    if let Some(ds) = filter.datastreams() {
        let ids = datastreams::ids(conn, database_num, ds)?;
        if ids.is_empty() {
            return Ok(None);
        }
        q.add_in("o.datastream_id", &ids);
    }

    if let Some(foi_filter) = filter.fois() {
        // NONE among the selected ids selects observations without a feature.
        let wants_none = foi_filter
            .internal_ids()
            .is_some_and(|ids| ids.contains(&ScopedId::NONE));
        let ids = fois::ids(conn, database_num, foi_filter)?;
        match (ids.is_empty(), wants_none) {
            (true, false) => return Ok(None),
            (true, true) => q.add("o.foi_id IS NULL"),
            (false, false) => q.add_in("o.foi_id", &ids),
            (false, true) => q.add(format!("({} OR o.foi_id IS NULL)", in_list("o.foi_id", &ids))),
        }
    }

    if let Some(location) = filter.phenomenon_location() {
        let located = FoiFilter::builder().with_location(location.clone()).build();
        let ids = fois::ids(conn, database_num, &located)?;
        if ids.is_empty() {
            return Ok(None);
        }
        q.add_in("o.foi_id", &ids);
    }

    if let Some(t) = filter.phenomenon_time() {
        time_clause(&mut q, "phenomenon_time", t);
    }
    if let Some(t) = filter.result_time() {
        time_clause(&mut q, "result_time", t);
    }

    Ok(Some(q))
}

fn read_observations(
    conn: &Connection,
    database_num: i32,
    sql: &str,
    q: &Clauses,
) -> Result<Vec<(ScopedId, Observation)>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(q.params().as_slice(), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, ds, foi, phenomenon, result_time, result) = row?;
        let result: Vec<DataValue> = serde_json::from_str(&result)?;
        out.push((
            scoped_id(database_num, id)?,
            Observation {
                datastream_id: scoped_id(database_num, ds)?,
                foi_id: match foi {
                    Some(f) => scoped_id(database_num, f)?,
                    None => ScopedId::NONE,
                },
                phenomenon_time: from_millis(phenomenon)?,
                result_time: from_millis(result_time)?,
                result,
            },
        ));
    }
    Ok(out)
}

fn distinct_ids(
    conn: &Connection,
    database_num: i32,
    column: &str,
    filter: &ObsFilter,
) -> Result<BTreeSet<i64>, StoreError> {
    let Some(q) = clauses(conn, database_num, filter)? else {
        return Ok(BTreeSet::new());
    };
    let sql = format!(
        "SELECT DISTINCT o.{column} FROM observations o{} AND o.{column} IS NOT NULL",
        where_or_true(&q)
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(q.params().as_slice(), |row| row.get::<_, i64>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(ids)
}

fn where_or_true(q: &Clauses) -> String {
    let sql = q.where_sql();
    if sql.is_empty() {
        " WHERE 1".to_string()
    } else {
        sql
    }
}

/// Datastreams with at least one matching observation.
pub(crate) fn datastream_ids(
    conn: &Connection,
    database_num: i32,
    filter: &ObsFilter,
) -> Result<BTreeSet<i64>, StoreError> {
    distinct_ids(conn, database_num, "datastream_id", filter)
}

/// Features of interest with at least one matching observation.
pub(crate) fn foi_ids(
    conn: &Connection,
    database_num: i32,
    filter: &ObsFilter,
) -> Result<BTreeSet<i64>, StoreError> {
    distinct_ids(conn, database_num, "foi_id", filter)
}

impl ObsStore for SqliteObsStore {
    fn add(&self, obs: &Observation) -> Result<ScopedId, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();

        let unknown_ds = || StoreError::UnknownParent {
            kind: "datastream",
            id: obs.datastream_id.clone(),
        };
        let ds = row_id(db, &obs.datastream_id).ok_or_else(unknown_ds)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM datastreams WHERE id = ?1)",
            [ds],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(unknown_ds());
        }

        let foi = if obs.foi_id.is_none() {
            None
        } else {
            let unknown_foi = || StoreError::UnknownParent {
                kind: "foi",
                id: obs.foi_id.clone(),
            };
            let foi = row_id(db, &obs.foi_id).ok_or_else(unknown_foi)?;
            let exists: bool =
                conn.query_row("SELECT EXISTS(SELECT 1 FROM fois WHERE id = ?1)", [foi], |r| r.get(0))?;
            if !exists {
                return Err(unknown_foi());
            }
            Some(foi)
        };

        conn.execute(
            "INSERT INTO observations (datastream_id, foi_id, phenomenon_time, result_time, result_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ds,
                foi,
                to_millis(obs.phenomenon_time),
                to_millis(obs.result_time),
                serde_json::to_string(&obs.result)?
            ],
        )?;
        scoped_id(db, conn.last_insert_rowid())
    }

    fn get(&self, id: &ScopedId) -> Result<Option<Observation>, StoreError> {
        let db = self.0.database_num;
        let Some(row) = row_id(db, id) else {
            return Ok(None);
        };
        let conn = self.0.lock();
        let mut q = Clauses::default();
        q.add_in("o.id", &[row]);
        let sql = format!("SELECT {OBS_COLUMNS} FROM observations o{}", q.where_sql());
        Ok(read_observations(&conn, db, &sql, &q)?.pop().map(|(_, obs)| obs))
    }

    fn select(&self, filter: &ObsFilter) -> Result<Vec<(ScopedId, Observation)>, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let Some(q) = clauses(&conn, db, filter)? else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {OBS_COLUMNS} FROM observations o{}{OBS_ORDER}{}",
            q.where_sql(),
            limit_sql(filter.skip(), filter.limit())
        );
        read_observations(&conn, db, &sql, &q)
    }

    fn count(&self, filter: &ObsFilter) -> Result<u64, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let Some(q) = clauses(&conn, db, filter)? else {
            return Ok(0);
        };
        let sql = format!("SELECT COUNT(*) FROM observations o{}", q.where_sql());
        let count: i64 = conn.query_row(&sql, q.params().as_slice(), |r| r.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn remove(&self, filter: &ObsFilter) -> Result<usize, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let Some(q) = clauses(&conn, db, filter)? else {
            return Ok(0);
        };
        let sql = format!(
            "DELETE FROM observations WHERE id IN (SELECT o.id FROM observations o{}{OBS_ORDER}{})",
            q.where_sql(),
            limit_sql(filter.skip(), filter.limit())
        );
        let removed = conn.execute(&sql, q.params().as_slice())?;
        tracing::debug!(removed, "removed observations");
        Ok(removed)
    }

    fn latest_phenomenon_time(&self, datastream_id: &ScopedId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(ds) = row_id(self.0.database_num, datastream_id) else {
            return Ok(None);
        };
        let conn = self.0.lock();
        let latest: Option<i64> = conn.query_row(
            "SELECT MAX(phenomenon_time) FROM observations WHERE datastream_id = ?1",
            [ds],
            |r| r.get(0),
        )?;
        latest.map(from_millis).transpose()
    }
}
