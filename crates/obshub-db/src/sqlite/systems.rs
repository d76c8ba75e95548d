use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use obshub_filter::prelude::*;
use obshub_id::ScopedId;
use obshub_types::{SystemDescription, TimeExtent};
use rusqlite::{params, Connection, OptionalExtension};

use super::query::{delete_ids, in_list, page, Clauses};
use super::{datastreams, from_millis, row_id, row_ids, scoped_id, to_millis, Inner};
use crate::error::StoreError;
use crate::store::SystemDescStore;

pub(crate) struct SqliteSystemStore(pub(crate) Arc<Inner>);

/// One stored version of a system.
pub(crate) struct SystemRow {
    pub(crate) id: i64,
    pub(crate) desc: SystemDescription,
    /// No later version exists.
    pub(crate) current: bool,
}

const VERSION_QUERY: &str = "SELECT s.id, s.parent_id, v.valid_from, v.body_json,
        (SELECT MIN(n.valid_from) FROM system_versions n
          WHERE n.system_id = v.system_id AND n.valid_from > v.valid_from) AS valid_to
     FROM systems s JOIN system_versions v ON v.system_id = s.id";

/// Reads versions, closing each validity period where the next version
/// starts and taking the parent from the live column.
fn read_versions(
    conn: &Connection,
    database_num: i32,
    q: &Clauses,
) -> Result<Vec<SystemRow>, StoreError> {
    let sql = format!("{VERSION_QUERY}{} ORDER BY s.id, v.valid_from", q.where_sql());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(q.params().as_slice(), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<i64>>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, parent, valid_from, body, valid_to) = row?;
        let mut desc: SystemDescription = serde_json::from_str(&body)?;
        let begin = from_millis(valid_from)?;
        desc.valid_time = match valid_to {
            Some(end) => TimeExtent::new(begin, from_millis(end)?),
            None => TimeExtent::starting_at(begin),
        };
        desc.parent_id = match parent {
            Some(p) => scoped_id(database_num, p)?,
            None => ScopedId::NONE,
        };
        out.push(SystemRow {
            id,
            desc,
            current: valid_to.is_none(),
        });
    }
    Ok(out)
}

fn test_procedure(filter: &SystemFilter, desc: &SystemDescription) -> bool {
    filter.procedures().map_or(true, |procedures| {
        desc.procedure_uid
            .as_deref()
            .is_some_and(|uid| procedures.feature_fields().test_unique_id(uid))
    })
}

/// Versions matching `filter`, ignoring member inclusion and paging.
pub(crate) fn resolve(
    conn: &Connection,
    database_num: i32,
    filter: &SystemFilter,
) -> Result<Vec<SystemRow>, StoreError> {
    let mut q = Clauses::default();

    if let Some(ids) = filter.internal_ids() {
        let ids = row_ids(database_num, ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("s.id", &ids);
    }

    if let Some(uids) = filter.unique_ids() {
        q.add_uids("s.uid", uids);
    }

    if let Some(parents) = filter.parents() {
        let ids = resolve_ids(conn, database_num, parents)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("s.parent_id", &ids);
    }

    if let Some(ds) = filter.datastreams() {
        let ids = datastreams::system_ids(conn, database_num, ds)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("s.id", &ids);
    }

    // Without an explicit period, or with `Latest`, only current versions.
    let current_only = filter.valid_time().map_or(true, TemporalFilter::is_latest);

    let mut rows = read_versions(conn, database_num, &q)?;
    rows.retain(|r| (!current_only || r.current) && filter.test(&r.desc) && test_procedure(filter, &r.desc));
    Ok(rows)
}

/// Ids of matching systems, with their members if the filter asks for them.
pub(crate) fn resolve_ids(
    conn: &Connection,
    database_num: i32,
    filter: &SystemFilter,
) -> Result<BTreeSet<i64>, StoreError> {
    let ids: BTreeSet<i64> = resolve(conn, database_num, filter)?.into_iter().map(|r| r.id).collect();
    if filter.include_members() {
        with_members(conn, ids)
    } else {
        Ok(ids)
    }
}

/// `roots` plus every system below them. Parent links may form cycles.
pub(crate) fn with_members(conn: &Connection, roots: BTreeSet<i64>) -> Result<BTreeSet<i64>, StoreError> {
    let mut all = roots.clone();
    let mut frontier = roots;
    while !frontier.is_empty() {
        let sql = format!("SELECT id FROM systems WHERE {}", in_list("parent_id", &frontier));
        let mut stmt = conn.prepare(&sql)?;
        let children = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        frontier = children.into_iter().filter(|c| all.insert(*c)).collect();
    }
    Ok(all)
}

fn parent_row(conn: &Connection, database_num: i32, parent: &ScopedId) -> Result<Option<i64>, StoreError> {
    if parent.is_none() {
        return Ok(None);
    }
    let unknown = || StoreError::UnknownParent {
        kind: "system",
        id: parent.clone(),
    };
    let id = row_id(database_num, parent).ok_or_else(unknown)?;
    let exists: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM systems WHERE id = ?1)", [id], |row| row.get(0))?;
    if exists {
        Ok(Some(id))
    } else {
        Err(unknown())
    }
}

fn upsert_version(conn: &Connection, id: i64, desc: &SystemDescription) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO system_versions (system_id, valid_from, body_json) VALUES (?1, ?2, ?3)
         ON CONFLICT (system_id, valid_from) DO UPDATE SET body_json = excluded.body_json",
        params![id, to_millis(desc.valid_time.begin()), serde_json::to_string(desc)?],
    )?;
    Ok(())
}

fn versions_of(conn: &Connection, database_num: i32, id: i64) -> Result<Vec<SystemRow>, StoreError> {
    let mut q = Clauses::default();
    q.add_in("s.id", &[id]);
    read_versions(conn, database_num, &q)
}

impl SystemDescStore for SqliteSystemStore {
    fn add(&self, desc: &SystemDescription) -> Result<ScopedId, StoreError> {
        let db = self.0.database_num;
        let mut conn = self.0.lock();
        let sp = conn.savepoint()?;

        let parent = parent_row(&sp, db, &desc.parent_id)?;
        let existing: Option<i64> = sp
            .query_row("SELECT id FROM systems WHERE uid = ?1", [&desc.uid], |row| row.get(0))
            .optional()?;
        let id = match existing {
            Some(id) => {
                sp.execute("UPDATE systems SET parent_id = ?2 WHERE id = ?1", params![id, parent])?;
                id
            }
            None => {
                sp.execute("INSERT INTO systems (uid, parent_id) VALUES (?1, ?2)", params![desc.uid, parent])?;
                sp.last_insert_rowid()
            }
        };
        upsert_version(&sp, id, desc)?;
        sp.commit()?;

        tracing::debug!(uid = %desc.uid, id, new = existing.is_none(), "stored system description");
        scoped_id(db, id)
    }

    fn put(&self, id: &ScopedId, desc: &SystemDescription) -> Result<(), StoreError> {
        let db = self.0.database_num;
        let not_found = || StoreError::NotFound {
            kind: "system",
            id: id.clone(),
        };
        let row = row_id(db, id).ok_or_else(not_found)?;

        let mut conn = self.0.lock();
        let sp = conn.savepoint()?;
        let uid: Option<String> = sp
            .query_row("SELECT uid FROM systems WHERE id = ?1", [row], |r| r.get(0))
            .optional()?;
        match uid {
            None => return Err(not_found()),
            Some(uid) if uid != desc.uid => {
                return Err(StoreError::InvalidData(format!(
                    "system {id} has unique id {uid}, not {}",
                    desc.uid
                )))
            }
            Some(_) => {}
        }
        let parent = parent_row(&sp, db, &desc.parent_id)?;
        sp.execute("UPDATE systems SET parent_id = ?2 WHERE id = ?1", params![row, parent])?;
        upsert_version(&sp, row, desc)?;
        sp.commit()?;
        Ok(())
    }

    fn get(&self, id: &ScopedId) -> Result<Option<SystemDescription>, StoreError> {
        let db = self.0.database_num;
        let Some(row) = row_id(db, id) else {
            return Ok(None);
        };
        let conn = self.0.lock();
        Ok(versions_of(&conn, db, row)?.pop().map(|r| r.desc))
    }

    fn get_at(&self, id: &ScopedId, time: DateTime<Utc>) -> Result<Option<SystemDescription>, StoreError> {
        let db = self.0.database_num;
        let Some(row) = row_id(db, id) else {
            return Ok(None);
        };
        let conn = self.0.lock();
        Ok(versions_of(&conn, db, row)?
            .into_iter()
            .rev()
            .find(|r| r.desc.valid_time.begin() <= time)
            .map(|r| r.desc))
    }

    fn latest_by_uid(&self, uid: &str) -> Result<Option<(ScopedId, SystemDescription)>, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let row: Option<i64> = conn
            .query_row("SELECT id FROM systems WHERE uid = ?1", [uid], |r| r.get(0))
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        match versions_of(&conn, db, row)?.pop() {
            Some(r) => Ok(Some((scoped_id(db, r.id)?, r.desc))),
            None => Ok(None),
        }
    }

    fn select(&self, filter: &SystemFilter) -> Result<Vec<(ScopedId, SystemDescription)>, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();

        let mut rows = resolve(&conn, db, filter)?;
        if filter.include_members() {
            let matched: BTreeSet<i64> = rows.iter().map(|r| r.id).collect();
            let members: BTreeSet<i64> = with_members(&conn, matched.clone())?
                .difference(&matched)
                .copied()
                .collect();
            if !members.is_empty() {
                let mut q = Clauses::default();
                q.add_in("s.id", &members);
                rows.extend(read_versions(&conn, db, &q)?.into_iter().filter(|r| r.current));
                rows.sort_by_key(|r| (r.id, r.desc.valid_time.begin()));
            }
        }

        page(rows, filter.skip(), filter.limit())
            .into_iter()
            .map(|r| Ok((scoped_id(db, r.id)?, r.desc)))
            .collect()
    }

    fn remove(&self, filter: &SystemFilter) -> Result<usize, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let ids = resolve_ids(&conn, db, filter)?;
        let removed = delete_ids(&conn, "systems", &ids)?;
        tracing::debug!(removed, "removed systems");
        Ok(removed)
    }
}
