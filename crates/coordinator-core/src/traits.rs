//! Capability interfaces standing in for the original design's duck-typed
//! collaborators (see the redesign notes on polymorphism-by-duck-typing).
//!
//! Concrete change sources, status targets, schedulers and slaves are
//! external collaborators — the core only needs to start them, stop them,
//! and (for status targets) tell them about changes and builder topology.

use crate::{error::Error, Change};
use async_trait::async_trait;

/// Lifecycle shared by every live component the reconciler manages.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Stable name, used for diffing against a new `ConfigModel`.
    fn name(&self) -> &str;

    /// Start the component. Called once, when the reconciler first creates it.
    async fn start(&self) -> Result<(), Error>;

    /// Stop the component. Called once, when the reconciler removes it (or
    /// replaces it with an updated instance).
    async fn stop(&self) -> Result<(), Error>;
}

/// An ingress component that discovers source-code changes and hands them to
/// the coordinator (which writes them to the database and publishes them).
#[async_trait]
pub trait ChangeSource: Lifecycle {
    /// Opaque kind identifier matching the [`crate::model::ChangeSourceSpec::kind`]
    /// that produced this instance, used to decide whether a reconfiguration
    /// actually changed anything.
    fn kind(&self) -> &str;
}

/// A consumer of live status events for external reporting (web dashboards,
/// webhooks, etc — rendering itself is out of scope for this crate).
#[async_trait]
pub trait StatusTarget: Lifecycle {
    /// Notify the target that a change was added.
    fn change_added(&self, _change: &Change) {}

    /// Notify the target that a builder was added, with its build directory
    /// and optional category.
    fn builder_added(&self, _name: &str, _build_dir: &str, _category: Option<&str>) {}

    /// Notify the target that a builder was removed.
    fn builder_removed(&self, _name: &str) {}

    /// Notify the target of a point-in-time event against a builder, e.g.
    /// `["master", "started"]` or `["config", "updated"]`.
    fn builder_point_event(&self, _name: &str, _tags: &[&str]) {}

    /// Apply the current global log caps to `name`'s status bookkeeping.
    /// Called for every builder on every reconfiguration, independently of
    /// whether that builder's own spec changed, so a reconfigure that only
    /// touches the global log caps still takes effect on already-running
    /// builders (§4.5.1).
    fn refresh_log_caps(&self, _name: &str, _caps: &crate::model::GlobalCaps) {}
}

/// A policy that decides when to turn changes into buildsets. The reconciler
/// only needs to start/stop it and know which builders it may target; the
/// policy itself is an external collaborator.
#[async_trait]
pub trait Scheduler: Lifecycle {
    /// Builder names this scheduler may request builds on.
    fn builder_names(&self) -> &[String];
}

/// A remote agent that executes build steps on behalf of a builder. The
/// slave registry (accepting connections, tracking liveness) lives outside
/// this crate; this is the minimal handle the reconciler needs.
pub trait Slave: Send + Sync {
    /// Declared slave name.
    fn name(&self) -> &str;
}
