//! The [`DbConnector`] trait: the one seam between the reconfiguration/dispatch
//! backbone and whatever actually stores changes, buildsets and state.

use async_trait::async_trait;
use coordinator_core::{Change, Error, NewBuildset, NewChange, ObjectId};

/// A connected, schema-checked handle to the buildmaster database.
///
/// Implementations are responsible for:
/// - assigning monotonically increasing primary keys to changes and buildsets,
/// - `(class_tag, qualified_name) -> objectid` resolution that is idempotent
///   across restarts,
/// - last-writer-wins, durable-before-resolve `(objectid, name) -> value` state.
#[async_trait]
pub trait DbConnector: Send + Sync {
    /// Establish the connection and run any startup bookkeeping. Called once,
    /// by the reconciler's database step, before anything else touches the DB.
    async fn start(&self) -> Result<(), Error>;

    /// Whether the schema is at the version this connector expects. `false`
    /// means the reconciler must fail the database step with
    /// [`Error::DatabaseNotReady`] rather than proceed.
    async fn is_current(&self) -> Result<bool, Error>;

    /// Insert a change, returning it with its assigned `changeid`.
    async fn insert_change(&self, change: NewChange) -> Result<Change, Error>;

    /// Fetch a change by id, or `None` if it doesn't exist.
    async fn get_change(&self, changeid: i64) -> Result<Option<Change>, Error>;

    /// The highest `changeid` currently stored, or `None` if the table is empty.
    async fn latest_changeid(&self) -> Result<Option<i64>, Error>;

    /// Insert a buildset, returning its assigned `bsid`.
    async fn insert_buildset(&self, buildset: NewBuildset) -> Result<i64, Error>;

    /// Resolve `(class_tag, qualified_name)` to a stable integer id,
    /// inserting a row on first call and returning the same id on every
    /// subsequent call (including across restarts).
    async fn get_object_id(&self, class_tag: &str, qualified_name: &str) -> Result<ObjectId, Error>;

    /// Fetch durable state for `(objectid, name)`, if any has been stored.
    async fn get_state(&self, objectid: ObjectId, name: &str) -> Result<Option<serde_json::Value>, Error>;

    /// Durably store `value` for `(objectid, name)`. Last writer wins; the
    /// write is durable before this future resolves.
    async fn set_state(&self, objectid: ObjectId, name: &str, value: serde_json::Value) -> Result<(), Error>;
}
