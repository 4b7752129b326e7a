//! Schema version and DDL for the sqlite connector.
//!
//! This is a deliberately small slice of the real buildmaster schema
//! (buildrequests/builds live in the builder runtime, out of scope here) —
//! just enough to back [`crate::connector::DbConnector`].

/// The schema version this crate's sqlite connector expects. Stored in
/// sqlite's `user_version` pragma; [`crate::sqlite::SqliteConnector::is_current`]
/// compares against it.
pub const SCHEMA_VERSION: i64 = 1;

pub(crate) const CREATE_CHANGES: &str = "
CREATE TABLE IF NOT EXISTS changes (
    changeid    INTEGER PRIMARY KEY AUTOINCREMENT,
    who         TEXT NOT NULL,
    comments    TEXT NOT NULL,
    branch      TEXT,
    revision    TEXT,
    category    TEXT,
    properties  TEXT NOT NULL,
    files       TEXT NOT NULL,
    \"when\"    INTEGER NOT NULL
)";

pub(crate) const CREATE_BUILDSETS: &str = "
CREATE TABLE IF NOT EXISTS buildsets (
    bsid              INTEGER PRIMARY KEY AUTOINCREMENT,
    reason            TEXT,
    builder_names     TEXT NOT NULL,
    properties        TEXT NOT NULL,
    external_idstring TEXT
)";

pub(crate) const CREATE_OBJECT_STATE: &str = "
CREATE TABLE IF NOT EXISTS objects (
    objectid       INTEGER PRIMARY KEY AUTOINCREMENT,
    class_tag      TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    UNIQUE(class_tag, qualified_name)
)";

pub(crate) const CREATE_STATE: &str = "
CREATE TABLE IF NOT EXISTS object_state (
    objectid INTEGER NOT NULL,
    name     TEXT NOT NULL,
    value    TEXT NOT NULL,
    PRIMARY KEY (objectid, name)
)";
