//! The [`Buildset`] domain object.

use crate::BuildResult;
use std::collections::BTreeMap;

/// An identified set of requested builds (`bsid`). Completion carries a
/// [`BuildResult`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Buildset {
    /// Primary key, assigned by the database on insert.
    pub bsid: i64,
    /// Free-form human-readable reason this buildset was created.
    pub reason: Option<String>,
    /// Builders this buildset requests builds on.
    pub builder_names: Vec<String>,
    /// Buildset-scoped properties, propagated to every resulting build.
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Opaque string surfaced to external callers (status pages, webhooks).
    pub external_idstring: Option<String>,
}

/// The fields a caller supplies to add a buildset; `bsid` is assigned by the
/// database (mirrors `addBuildset(**kwargs)`).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NewBuildset {
    /// Free-form human-readable reason this buildset was created.
    pub reason: Option<String>,
    /// Builders this buildset requests builds on.
    pub builder_names: Vec<String>,
    /// Buildset-scoped properties, propagated to every resulting build.
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Opaque string surfaced to external callers (status pages, webhooks).
    pub external_idstring: Option<String>,
}

/// Delivered on the `buildset_completion` bus when a buildset finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildsetCompletion {
    /// Which buildset completed.
    pub bsid: i64,
    /// Its outcome.
    pub result: BuildResult,
}
