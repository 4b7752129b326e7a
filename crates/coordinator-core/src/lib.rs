//! Shared domain types for the buildmaster coordinator.
//!
//! This crate holds the data model that the rest of the workspace agrees on —
//! [`model::ConfigModel`] and its constituents, [`Change`](change::Change) and
//! [`Buildset`](buildset::Buildset), [`identity::MasterIdentity`], the capability
//! traits that stand in for the duck-typed collaborators of the original design
//! ([`traits::ChangeSource`], [`traits::StatusTarget`], [`traits::Scheduler`],
//! [`traits::Slave`]), and the [`error::Error`] taxonomy. None of the validation
//! logic lives here — that belongs to `coordinator-config`, which builds a
//! [`model::ConfigModel`] from a raw artifact and enforces the invariants.

pub mod buildset;
pub mod change;
pub mod error;
pub mod identity;
pub mod model;
pub mod traits;
pub mod util;

pub use buildset::{Buildset, BuildsetCompletion, NewBuildset};
pub use change::{Change, NewChange};
pub use error::Error;
pub use identity::MasterIdentity;
pub use model::ConfigModel;

/// Convenience alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A durable per-master object id, resolved once by the state store and then
/// memoised by whoever owns it (never recomputed behind the owner's back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ObjectId(pub i64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable identity for a domain lock, shared by name across builders and
/// build-factory steps. Two [`LockRef`](model::LockRef)s with the same `name`
/// must carry the same `LockId`, or config validation rejects the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct LockId(pub u64);

/// Result code attached to a completed buildset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BuildResult(pub i32);

impl BuildResult {
    /// Conventional "everything passed" result code.
    pub const SUCCESS: BuildResult = BuildResult(0);
    /// Conventional "something failed" result code.
    pub const FAILURE: BuildResult = BuildResult(2);
}
