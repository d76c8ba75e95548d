use std::collections::BTreeSet;
use std::sync::Arc;

use obshub_filter::prelude::*;
use obshub_id::ScopedId;
use obshub_types::Feature;
use rusqlite::{params, Connection, OptionalExtension};

use super::query::{delete_ids, page, Clauses};
use super::{obs, row_id, row_ids, scoped_id, systems, Inner};
use crate::error::StoreError;
use crate::store::FoiStore;

pub(crate) struct SqliteFoiStore(pub(crate) Arc<Inner>);

fn read_fois(conn: &Connection, q: &Clauses) -> Result<Vec<(i64, Feature)>, StoreError> {
    let sql = format!("SELECT f.id, f.body_json FROM fois f{} ORDER BY f.id", q.where_sql());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(q.params().as_slice(), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, body) = row?;
        out.push((id, serde_json::from_str(&body)?));
    }
    Ok(out)
}

fn test_sampled_feature(filter: &FoiFilter, foi: &Feature) -> bool {
    filter.sampled_features().map_or(true, |sampled| {
        foi.sampled_feature_uid
            .as_deref()
            .is_some_and(|uid| sampled.feature_fields().test_unique_id(uid))
    })
}

/// Features matching `filter`, ignoring paging. Member inclusion widens the
/// parent systems to their members.
pub(crate) fn resolve(
    conn: &Connection,
    database_num: i32,
    filter: &FoiFilter,
) -> Result<Vec<(i64, Feature)>, StoreError> {
    let mut q = Clauses::default();

    if let Some(ids) = filter.internal_ids() {
        let ids = row_ids(database_num, ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("f.id", &ids);
    }

    if let Some(uids) = filter.unique_ids() {
        q.add_uids("f.uid", uids);
    }

    if let Some(parents) = filter.parents() {
        let mut ids = systems::resolve_ids(conn, database_num, parents)?;
        if filter.include_members() {
            ids = systems::with_members(conn, ids)?;
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("f.parent_id", &ids);
    }

    if let Some(observations) = filter.observations() {
        let ids = obs::foi_ids(conn, database_num, observations)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("f.id", &ids);
    }

    let mut rows = read_fois(conn, &q)?;
    rows.retain(|(_, foi)| filter.test(foi) && test_sampled_feature(filter, foi));
    Ok(rows)
}

pub(crate) fn ids(
    conn: &Connection,
    database_num: i32,
    filter: &FoiFilter,
) -> Result<BTreeSet<i64>, StoreError> {
    Ok(resolve(conn, database_num, filter)?.into_iter().map(|(id, _)| id).collect())
}

impl FoiStore for SqliteFoiStore {
    fn add(&self, parent_id: &ScopedId, feature: &Feature) -> Result<ScopedId, StoreError> {
        let db = self.0.database_num;
        let mut conn = self.0.lock();
        let sp = conn.savepoint()?;

        let parent = if parent_id.is_none() {
            None
        } else {
            let unknown = || StoreError::UnknownParent {
                kind: "system",
                id: parent_id.clone(),
            };
            let row = row_id(db, parent_id).ok_or_else(unknown)?;
            let exists: bool = sp.query_row(
                "SELECT EXISTS(SELECT 1 FROM systems WHERE id = ?1)",
                [row],
                |r| r.get(0),
            )?;
            if !exists {
                return Err(unknown());
            }
            Some(row)
        };

        let body = serde_json::to_string(feature)?;
        let existing: Option<i64> = sp
            .query_row("SELECT id FROM fois WHERE uid = ?1", [&feature.uid], |r| r.get(0))
            .optional()?;
        let id = match existing {
            Some(id) => {
                // A feature keeps the parent that reported it first.
                sp.execute(
                    "UPDATE fois SET body_json = ?2, parent_id = COALESCE(parent_id, ?3) WHERE id = ?1",
                    params![id, body, parent],
                )?;
                id
            }
            None => {
                sp.execute(
                    "INSERT INTO fois (uid, parent_id, body_json) VALUES (?1, ?2, ?3)",
                    params![feature.uid, parent, body],
                )?;
                sp.last_insert_rowid()
            }
        };
        sp.commit()?;

        tracing::debug!(uid = %feature.uid, id, "stored feature of interest");
        scoped_id(db, id)
    }

    fn put(&self, id: &ScopedId, feature: &Feature) -> Result<(), StoreError> {
        let db = self.0.database_num;
        let not_found = || StoreError::NotFound {
            kind: "foi",
            id: id.clone(),
        };
        let row = row_id(db, id).ok_or_else(not_found)?;
        let conn = self.0.lock();
        let updated = conn.execute(
            "UPDATE fois SET uid = ?2, body_json = ?3 WHERE id = ?1",
            params![row, feature.uid, serde_json::to_string(feature)?],
        )?;
        if updated == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    fn get(&self, id: &ScopedId) -> Result<Option<Feature>, StoreError> {
        let Some(row) = row_id(self.0.database_num, id) else {
            return Ok(None);
        };
        let conn = self.0.lock();
        let body: Option<String> = conn
            .query_row("SELECT body_json FROM fois WHERE id = ?1", [row], |r| r.get(0))
            .optional()?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    fn get_by_uid(&self, uid: &str) -> Result<Option<(ScopedId, Feature)>, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let row: Option<(i64, String)> = conn
            .query_row("SELECT id, body_json FROM fois WHERE uid = ?1", [uid], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .optional()?;
        match row {
            Some((id, body)) => Ok(Some((scoped_id(db, id)?, serde_json::from_str(&body)?))),
            None => Ok(None),
        }
    }

    fn select(&self, filter: &FoiFilter) -> Result<Vec<(ScopedId, Feature)>, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let rows = resolve(&conn, db, filter)?;
        page(rows, filter.skip(), filter.limit())
            .into_iter()
            .map(|(id, foi)| Ok((scoped_id(db, id)?, foi)))
            .collect()
    }

    fn remove(&self, filter: &FoiFilter) -> Result<usize, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let ids = ids(&conn, db, filter)?;
        let removed = delete_ids(&conn, "fois", &ids)?;
        tracing::debug!(removed, "removed features of interest");
        Ok(removed)
    }
}
