//! The mutable registry the reconciler edits.
//!
//! Entries are born when a [`coordinator_core::ConfigModel`] first
//! introduces them, mutated in place when their spec changes, and torn down
//! when removed — never all at once. `LiveGraph` itself does no I/O; the
//! [`crate::reconciler::Reconciler`] is the only writer.

use coordinator_core::model::{BuilderSpec, ChangeSourceSpec, RemoteShellSpec, StatusTargetSpec};
use coordinator_core::traits::{ChangeSource, StatusTarget};
use coordinator_db::DbConnector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A builder as tracked by the live graph: its current spec plus whatever
/// worker attachments survived the most recent reconfiguration.
///
/// `PartialEq` on [`BuilderSpec`] is exactly `compareToSetup`; this type adds
/// the bit of runtime state (`attached_slaves`) that must survive a builder
/// being replaced in place.
#[derive(Debug, Clone)]
pub struct Builder {
    /// The spec this builder was last built or rebuilt from.
    pub spec: BuilderSpec,
    /// Slave names currently attached to this builder. Preserved across an
    /// in-place replacement by [`Builder::transfer_state`]
    /// ("consumeTheSoulOfYourPredecessor").
    pub attached_slaves: Vec<String>,
}

impl Builder {
    /// A freshly created builder for `spec`, with no attachments yet — the
    /// worker registry populates `attached_slaves` once it has matched
    /// declared slave names to live connections.
    pub fn new(spec: BuilderSpec) -> Self {
        Builder {
            spec,
            attached_slaves: Vec::new(),
        }
    }

    /// Move `old`'s worker attachments onto this (already-replaced) builder.
    /// The status handle itself is addressed by builder name, which is
    /// unchanged across a replacement, so there is nothing else to carry over.
    pub fn transfer_state(&mut self, old: Builder) {
        self.attached_slaves = old.attached_slaves;
    }
}

/// The mutable component registry.
#[derive(Default)]
pub struct LiveGraph {
    /// Live builders, keyed by name.
    pub builders: BTreeMap<String, Builder>,
    /// Live status targets, keyed by name.
    pub status_targets: BTreeMap<String, Arc<dyn StatusTarget>>,
    /// Live change sources, keyed by name.
    pub change_sources: BTreeMap<String, Arc<dyn ChangeSource>>,
    /// Scheduler names currently known to the (externally owned) scheduler
    /// registry. The registry itself owns scheduler lifecycle; this is kept
    /// only so the reconciler can report what changed.
    pub scheduler_names: std::collections::BTreeSet<String>,
    /// The attached database connector, once step 1 of the reconciler has run.
    pub db: Option<Arc<dyn DbConnector>>,
    /// The currently-attached remote-shell spec, if any.
    pub remote_shell: Option<RemoteShellSpec>,
    /// Whether a debug client is currently registered, and under which
    /// password, so step 8 can detect a change.
    pub debug_password: Option<String>,
    /// Background timer tasks installed once `db_poll_interval` is set
    /// (the change poller and the build-dispatch waker). Aborted and
    /// replaced if a later reconfiguration changes the interval.
    pub timers: Vec<JoinHandle<()>>,
    /// Set once the first reconfiguration completes successfully; the
    /// coordinator uses this to decide whether a start-up config-load
    /// failure should proceed with an empty graph.
    pub configured: bool,
}

impl LiveGraph {
    /// An empty graph, as it exists before the first successful reconfiguration.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drop for LiveGraph {
    fn drop(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::model::BuildFactorySpec;

    fn spec(name: &str) -> BuilderSpec {
        BuilderSpec {
            name: name.into(),
            build_dir: name.into(),
            slave_build_dir: name.into(),
            slave_names: vec![],
            category: None,
            event_horizon: 50,
            log_horizon: None,
            build_horizon: None,
            locks: vec![],
            factory: BuildFactorySpec::default(),
        }
    }

    #[test]
    fn transfer_state_preserves_attachments() {
        let mut old = Builder::new(spec("b1"));
        old.attached_slaves = vec!["slave1".into()];
        let mut replacement = Builder::new(spec("b1"));
        replacement.transfer_state(old);
        assert_eq!(replacement.attached_slaves, vec!["slave1".to_string()]);
    }
}
