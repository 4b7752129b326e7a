//! The [`Change`] domain object.

use std::collections::BTreeMap;

/// An ingested source-code change, identified by a monotonically assigned
/// `changeid`. Persisted by `coordinator-db`; delivered on the `changes`
/// [`SubscriptionBus`](../coordinator_runtime/bus/struct.SubscriptionBus.html).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Change {
    /// Monotonically increasing primary key, assigned by the database on insert.
    pub changeid: i64,
    /// Who made the change (committer identity, free-form).
    pub who: String,
    /// Commit message / change description.
    pub comments: String,
    /// Branch the change landed on, if known.
    pub branch: Option<String>,
    /// VCS revision identifier, if known.
    pub revision: Option<String>,
    /// Scheduler-routing category, if the change source assigns one.
    pub category: Option<String>,
    /// Arbitrary change-scoped properties supplied by the change source.
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Paths touched by the change.
    pub files: Vec<String>,
    /// When the change was made, epoch seconds.
    pub when: i64,
}

/// The fields a caller supplies to add a change; `changeid` is assigned by the
/// database and is therefore absent here (mirrors `addChange(**kwargs)`).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NewChange {
    /// Who made the change.
    pub who: String,
    /// Commit message / change description.
    pub comments: String,
    /// Branch the change landed on, if known.
    pub branch: Option<String>,
    /// VCS revision identifier, if known.
    pub revision: Option<String>,
    /// Scheduler-routing category, if the change source assigns one.
    pub category: Option<String>,
    /// Arbitrary change-scoped properties supplied by the change source.
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Paths touched by the change.
    pub files: Vec<String>,
    /// When the change was made, epoch seconds.
    pub when: i64,
}
