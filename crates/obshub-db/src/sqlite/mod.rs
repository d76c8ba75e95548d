//! SQLite implementation of [`ObsSystemDatabase`].
//!
//! One connection serves all stores. It always holds an open transaction,
//! so writes are visible immediately and become durable on
//! [`ObsSystemDatabase::commit`]. Each store operation runs in its own
//! savepoint and is applied entirely or not at all.

mod datastreams;
mod fois;
mod obs;
mod query;
mod systems;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use obshub_id::ScopedId;
use rusqlite::Connection;

use crate::connection::{open_connection, DbRuntimeSettings};
use crate::error::StoreError;
use crate::migrations::run_migrations;
use crate::store::{DataStreamStore, FoiStore, ObsStore, ObsSystemDatabase, SystemDescStore};

pub(crate) struct Inner {
    conn: Mutex<Connection>,
    database_num: i32,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A SQLite-backed observation database.
pub struct SqliteDatabase {
    inner: Arc<Inner>,
    systems: systems::SqliteSystemStore,
    datastreams: datastreams::SqliteDataStreamStore,
    fois: fois::SqliteFoiStore,
    obs: obs::SqliteObsStore,
}

impl SqliteDatabase {
    /// Opens (or creates) the database at `path` and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, WAL mode is refused,
    /// or a migration fails.
    pub fn open(path: impl AsRef<Path>, settings: DbRuntimeSettings) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = open_connection(path, settings)?;
        let applied = run_migrations(&conn)?;
        conn.execute_batch("BEGIN")?;

        tracing::info!(
            path = %path.display(),
            database_num = settings.database_num,
            migrations_applied = applied,
            "opened observation database"
        );

        let inner = Arc::new(Inner {
            conn: Mutex::new(conn),
            database_num: settings.database_num,
        });
        Ok(Self {
            systems: systems::SqliteSystemStore(inner.clone()),
            datastreams: datastreams::SqliteDataStreamStore(inner.clone()),
            fois: fois::SqliteFoiStore(inner.clone()),
            obs: obs::SqliteObsStore(inner.clone()),
            inner,
        })
    }

    /// An in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub fn open_in_memory(database_num: i32) -> Result<Self, StoreError> {
        Self::open(
            ":memory:",
            DbRuntimeSettings {
                database_num,
                ..DbRuntimeSettings::default()
            },
        )
    }
}

impl ObsSystemDatabase for SqliteDatabase {
    fn database_num(&self) -> i32 {
        self.inner.database_num
    }

    fn system_store(&self) -> &dyn SystemDescStore {
        &self.systems
    }

    fn datastream_store(&self) -> &dyn DataStreamStore {
        &self.datastreams
    }

    fn foi_store(&self) -> &dyn FoiStore {
        &self.fois
    }

    fn obs_store(&self) -> &dyn ObsStore {
        &self.obs
    }

    fn commit(&self) -> Result<(), StoreError> {
        let conn = self.inner.lock();
        if conn.is_autocommit() {
            // A previous commit got through COMMIT but not BEGIN.
            conn.execute_batch("BEGIN")?;
            return Ok(());
        }
        conn.execute_batch("COMMIT; BEGIN")?;
        tracing::trace!("committed observation database");
        Ok(())
    }
}

/// The row id behind `id`, if it belongs to this database.
pub(crate) fn row_id(database_num: i32, id: &ScopedId) -> Option<i64> {
    if id.is_none() || id.scope() != database_num {
        return None;
    }
    id.as_long().ok().filter(|v| *v > 0)
}

pub(crate) fn row_ids(database_num: i32, ids: &BTreeSet<ScopedId>) -> BTreeSet<i64> {
    ids.iter().filter_map(|id| row_id(database_num, id)).collect()
}

pub(crate) fn scoped_id(database_num: i32, row_id: i64) -> Result<ScopedId, StoreError> {
    ScopedId::from_long(database_num, row_id)
        .map_err(|e| StoreError::InvalidData(format!("row id {row_id}: {e}")))
}

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {ms}")))
}

#[cfg(test)]
mod tests;
