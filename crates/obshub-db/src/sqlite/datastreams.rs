use std::collections::BTreeSet;
use std::sync::Arc;

use obshub_filter::prelude::*;
use obshub_id::ScopedId;
use obshub_types::{DataStreamInfo, TimeExtent};
use rusqlite::{params, Connection, OptionalExtension};

use super::query::{delete_ids, page, Clauses};
use super::{from_millis, obs, row_id, row_ids, scoped_id, systems, to_millis, Inner};
use crate::error::StoreError;
use crate::store::DataStreamStore;

pub(crate) struct SqliteDataStreamStore(pub(crate) Arc<Inner>);

pub(crate) struct DataStreamRow {
    pub(crate) id: i64,
    pub(crate) system_id: i64,
    pub(crate) info: DataStreamInfo,
    /// No later version of the same output exists.
    pub(crate) current: bool,
}

const DATASTREAM_QUERY: &str = "SELECT d.id, d.system_id, d.valid_from, d.body_json,
        (SELECT MIN(n.valid_from) FROM datastreams n
          WHERE n.system_id = d.system_id AND n.output_name = d.output_name
            AND n.version > d.version) AS valid_to
     FROM datastreams d";

fn read_datastreams(
    conn: &Connection,
    database_num: i32,
    q: &Clauses,
) -> Result<Vec<DataStreamRow>, StoreError> {
    let sql = format!("{DATASTREAM_QUERY}{} ORDER BY d.id", q.where_sql());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(q.params().as_slice(), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<i64>>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, system_id, valid_from, body, valid_to) = row?;
        let mut info: DataStreamInfo = serde_json::from_str(&body)?;
        let begin = from_millis(valid_from)?;
        info.valid_time = match valid_to {
            Some(end) => TimeExtent::new(begin, from_millis(end)?),
            None => TimeExtent::starting_at(begin),
        };
        info.system_id = scoped_id(database_num, system_id)?;
        out.push(DataStreamRow {
            id,
            system_id,
            info,
            current: valid_to.is_none(),
        });
    }
    Ok(out)
}

/// Datastream versions matching `filter`, ignoring paging.
pub(crate) fn resolve(
    conn: &Connection,
    database_num: i32,
    filter: &DataStreamFilter,
) -> Result<Vec<DataStreamRow>, StoreError> {
    let mut q = Clauses::default();

    if let Some(ids) = filter.internal_ids() {
        let ids = row_ids(database_num, ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("d.id", &ids);
    }

    if let Some(names) = filter.output_names() {
        q.add_text_in("d.output_name", names);
    }

    if let Some(sys) = filter.systems() {
        let ids = systems::resolve_ids(conn, database_num, sys)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("d.system_id", &ids);
    }

    if let Some(observations) = filter.observations() {
        let ids = obs::datastream_ids(conn, database_num, observations)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        q.add_in("d.id", &ids);
    }

    let current_only = filter.valid_time().is_some_and(TemporalFilter::is_latest);

    let mut rows = read_datastreams(conn, database_num, &q)?;
    rows.retain(|r| (!current_only || r.current) && filter.test(&r.info));
    Ok(rows)
}

pub(crate) fn ids(
    conn: &Connection,
    database_num: i32,
    filter: &DataStreamFilter,
) -> Result<BTreeSet<i64>, StoreError> {
    Ok(resolve(conn, database_num, filter)?.into_iter().map(|r| r.id).collect())
}

/// Systems owning at least one matching datastream.
pub(crate) fn system_ids(
    conn: &Connection,
    database_num: i32,
    filter: &DataStreamFilter,
) -> Result<BTreeSet<i64>, StoreError> {
    Ok(resolve(conn, database_num, filter)?
        .into_iter()
        .map(|r| r.system_id)
        .collect())
}

fn system_row(conn: &Connection, database_num: i32, system_id: &ScopedId) -> Result<i64, StoreError> {
    let unknown = || StoreError::UnknownParent {
        kind: "system",
        id: system_id.clone(),
    };
    let id = row_id(database_num, system_id).ok_or_else(unknown)?;
    let exists: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM systems WHERE id = ?1)", [id], |row| row.get(0))?;
    if exists {
        Ok(id)
    } else {
        Err(unknown())
    }
}

fn by_row_id(conn: &Connection, database_num: i32, id: i64) -> Result<Option<DataStreamRow>, StoreError> {
    let mut q = Clauses::default();
    q.add_in("d.id", &[id]);
    Ok(read_datastreams(conn, database_num, &q)?.pop())
}

impl DataStreamStore for SqliteDataStreamStore {
    fn add(&self, info: &DataStreamInfo) -> Result<ScopedId, StoreError> {
        let db = self.0.database_num;
        let mut conn = self.0.lock();
        let sp = conn.savepoint()?;

        let system = system_row(&sp, db, &info.system_id)?;
        let body = serde_json::to_string(info)?;
        let valid_from = to_millis(info.valid_time.begin());
        let existing: Option<i64> = sp
            .query_row(
                "SELECT id FROM datastreams WHERE system_id = ?1 AND output_name = ?2 AND version = ?3",
                params![system, info.output_name, info.version],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                sp.execute(
                    "UPDATE datastreams SET valid_from = ?2, body_json = ?3 WHERE id = ?1",
                    params![id, valid_from, body],
                )?;
                id
            }
            None => {
                sp.execute(
                    "INSERT INTO datastreams (system_id, output_name, version, valid_from, body_json)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![system, info.output_name, info.version, valid_from, body],
                )?;
                sp.last_insert_rowid()
            }
        };
        sp.commit()?;

        tracing::debug!(
            system_uid = %info.system_uid,
            output = %info.output_name,
            version = info.version,
            id,
            "stored datastream"
        );
        scoped_id(db, id)
    }

    fn put(&self, id: &ScopedId, info: &DataStreamInfo) -> Result<(), StoreError> {
        let db = self.0.database_num;
        let not_found = || StoreError::NotFound {
            kind: "datastream",
            id: id.clone(),
        };
        let row = row_id(db, id).ok_or_else(not_found)?;
        let conn = self.0.lock();
        let updated = conn.execute(
            "UPDATE datastreams SET output_name = ?2, version = ?3, valid_from = ?4, body_json = ?5
             WHERE id = ?1",
            params![
                row,
                info.output_name,
                info.version,
                to_millis(info.valid_time.begin()),
                serde_json::to_string(info)?
            ],
        )?;
        if updated == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    fn get(&self, id: &ScopedId) -> Result<Option<DataStreamInfo>, StoreError> {
        let db = self.0.database_num;
        let Some(row) = row_id(db, id) else {
            return Ok(None);
        };
        let conn = self.0.lock();
        Ok(by_row_id(&conn, db, row)?.map(|r| r.info))
    }

    fn latest_for_output(
        &self,
        system_uid: &str,
        output_name: &str,
    ) -> Result<Option<(ScopedId, DataStreamInfo)>, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let row: Option<i64> = conn
            .query_row(
                "SELECT d.id FROM datastreams d JOIN systems s ON s.id = d.system_id
                 WHERE s.uid = ?1 AND d.output_name = ?2
                 ORDER BY d.version DESC LIMIT 1",
                params![system_uid, output_name],
                |r| r.get(0),
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        match by_row_id(&conn, db, row)? {
            Some(r) => Ok(Some((scoped_id(db, r.id)?, r.info))),
            None => Ok(None),
        }
    }

    fn select(&self, filter: &DataStreamFilter) -> Result<Vec<(ScopedId, DataStreamInfo)>, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let rows = resolve(&conn, db, filter)?;
        page(rows, filter.skip(), filter.limit())
            .into_iter()
            .map(|r| Ok((scoped_id(db, r.id)?, r.info)))
            .collect()
    }

    fn remove(&self, filter: &DataStreamFilter) -> Result<usize, StoreError> {
        let db = self.0.database_num;
        let conn = self.0.lock();
        let ids = ids(&conn, db, filter)?;
        let removed = delete_ids(&conn, "datastreams", &ids)?;
        tracing::debug!(removed, "removed datastreams");
        Ok(removed)
    }
}
