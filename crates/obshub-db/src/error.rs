//! Error types for the store.

use obshub_id::ScopedId;

use crate::migrations::MigrationError;

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored body could not be serialised or deserialised.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database could not be brought up to the current schema.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A dependent resource names a parent that does not exist.
    #[error("unknown {kind} {id:?}")]
    UnknownParent {
        /// Kind of the missing parent, e.g. `"system"`.
        kind: &'static str,
        /// The id that was looked up.
        id: ScopedId,
    },

    /// A resource to update does not exist.
    #[error("no {kind} with id {id:?}")]
    NotFound {
        kind: &'static str,
        id: ScopedId,
    },

    /// A stored value is outside the range this crate can represent.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    /// SQLite refused WAL journal mode.
    #[error("failed to set WAL journal mode, got: {0}")]
    JournalMode(String),
}
