//! The database connector: changes, buildsets, buildrequests/builds (opaque to
//! this crate) and the `(objectid, name) -> value` state table.
//!
//! The wire schema for buildrequests/builds belongs to the builder runtime,
//! out of scope here (see the external interfaces section of the spec this
//! crate implements) — `coordinator-db` only owns the tables the
//! reconfiguration/dispatch backbone actually reads and writes: `changes`,
//! `buildsets`, and `object_state`.

pub mod connector;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use connector::DbConnector;
pub use sqlite::SqliteConnector;
