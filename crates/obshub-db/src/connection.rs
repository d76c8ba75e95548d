//! Connection opening and configuration.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::StoreError;

/// Runtime tunables for the SQLite connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for the SQLite connection, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Scope of every id the database issues.
    pub database_num: i32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            database_num: 1,
        }
    }
}

/// Opens a SQLite connection with WAL mode and foreign keys enabled.
///
/// Use `:memory:` for an in-memory database.
///
/// # Errors
///
/// Returns [`StoreError::JournalMode`] if SQLite refuses WAL mode, or
/// [`StoreError::Database`] if the file cannot be opened.
pub fn open_connection(path: &Path, settings: DbRuntimeSettings) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;

    // In-memory databases report "memory", which is expected.
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(StoreError::JournalMode(journal_mode));
    }

    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {};",
        settings.busy_timeout_ms
    ))?;

    Ok(conn)
}
