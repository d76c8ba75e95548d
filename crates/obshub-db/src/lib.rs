//! Persistence layer for the observation hub.
//!
//! Defines the store traits the ingestion pipeline writes through and a
//! SQLite implementation of them. All tables are created through versioned
//! migrations embedded in this crate.
//!
//! # Design decisions
//!
//! - **One writer connection with an open transaction**: writes are visible
//!   at once and become durable in batches when [`ObsSystemDatabase::commit`]
//!   runs, so the commit cadence is decided by the caller.
//! - **Ids are row ids**: every resource id is the SQLite row id scoped by
//!   the database number, so ids are compact and ordered by insertion.
//! - **Bodies are JSON**: only the columns filters need are broken out;
//!   everything else is tested in memory after the indexed columns narrow
//!   the candidates down.

mod connection;
mod error;
mod migrations;
mod sqlite;
mod store;

pub use connection::{open_connection, DbRuntimeSettings};
pub use error::StoreError;
pub use migrations::{run_migrations, MigrationError};
pub use sqlite::SqliteDatabase;
pub use store::{DataStreamStore, FoiStore, ObsStore, ObsSystemDatabase, SystemDescStore};
