//! Seams onto the external collaborators the reconciler delegates to.
//!
//! Everything in this module is a trait the embedder implements: the worker
//! registry ("BotMaster"), the scheduler registry, the remote-shell listener
//! and the debug-client registration are all out of scope for this crate
//! (see the external interfaces this crate consumes), but the reconciler
//! still needs a seam to call into them in the fixed step order the
//! specification requires.

use async_trait::async_trait;
use coordinator_core::model::{BuilderSpec, ChangeSourceSpec, RemoteShellSpec, SlaveSpec, StatusTargetSpec};
use coordinator_core::traits::{ChangeSource, StatusTarget};
use coordinator_core::{Error, MasterIdentity};
use coordinator_db::DbConnector;
use std::sync::Arc;

/// Builds a connected, started [`DbConnector`] from a `db_url`.
#[async_trait]
pub trait DbConnectorFactory: Send + Sync {
    /// Connect to `db_url`. Does not check schema currency — the reconciler
    /// does that itself so it can produce [`Error::DatabaseNotReady`].
    async fn connect(&self, db_url: &str) -> Result<Arc<dyn DbConnector>, Error>;
}

/// The worker-facing registry ("BotMaster"): tracks which slaves are
/// connected and which builders they may execute for.
pub trait SlaveRegistry: Send + Sync {
    /// Propagate this coordinator's identity, once, at construction.
    fn set_identity(&self, identity: &MasterIdentity);

    /// Replace the full set of declared slaves.
    fn refresh_slaves(&self, slaves: &[SlaveSpec]);

    /// Replace the full ordered list of builders, called whenever the
    /// builder diff (§4.5.1) actually changed anything.
    fn refresh_builders(&self, builders: &[BuilderSpec]);
}

/// The scheduler registry: owns scheduler lifecycle and performs its own
/// add/remove/update diff against a new set of specs.
#[async_trait]
pub trait SchedulerRegistry: Send + Sync {
    /// Reconcile the registry's live schedulers against `specs`.
    async fn reconcile(&self, specs: &[coordinator_core::model::SchedulerSpec]) -> Result<(), Error>;
}

/// Builds a [`ChangeSource`] instance for a declared change-source spec.
pub trait ChangeSourceFactory: Send + Sync {
    /// Construct (but do not start) a change source for `spec`.
    fn build(&self, spec: &ChangeSourceSpec) -> Arc<dyn ChangeSource>;
}

/// Builds a [`StatusTarget`] instance for a declared status-target spec.
pub trait StatusTargetFactory: Send + Sync {
    /// Construct (but do not start) a status target for `spec`.
    fn build(&self, spec: &StatusTargetSpec) -> Arc<dyn StatusTarget>;
}

/// The remote-shell ("manhole") listener.
#[async_trait]
pub trait RemoteShellService: Send + Sync {
    /// Stop listening.
    async fn detach(&self) -> Result<(), Error>;

    /// Start listening on `spec.endpoint`.
    async fn attach(&self, spec: &RemoteShellSpec) -> Result<(), Error>;
}

/// The debug-client credential registered against the worker-listener port.
#[async_trait]
pub trait DebugClient: Send + Sync {
    /// Unregister whatever credential is currently registered, if any.
    async fn unregister(&self) -> Result<(), Error>;

    /// Register `password` against `worker_listener_endpoint`.
    async fn register(&self, password: &str, worker_listener_endpoint: &str) -> Result<(), Error>;
}

/// Wakes the build-dispatch loop. Out of scope for this crate (dispatch
/// itself belongs to the builder runtime), but the reconciler and the
/// coordinator's public `addBuildset` both need to poke it.
pub trait DispatchWaker: Send + Sync {
    /// Wake the loop. Idempotent and non-blocking; typically just sets a
    /// flag or sends on an already-buffered channel.
    fn wake(&self);
}

/// Bundle of every external collaborator the reconciler needs, supplied by
/// the embedder at `Coordinator` construction time.
pub struct Collaborators {
    /// See [`DbConnectorFactory`].
    pub db: Arc<dyn DbConnectorFactory>,
    /// See [`SlaveRegistry`].
    pub slaves: Arc<dyn SlaveRegistry>,
    /// See [`SchedulerRegistry`].
    pub schedulers: Arc<dyn SchedulerRegistry>,
    /// See [`ChangeSourceFactory`].
    pub change_sources: Arc<dyn ChangeSourceFactory>,
    /// See [`StatusTargetFactory`].
    pub status_targets: Arc<dyn StatusTargetFactory>,
    /// See [`RemoteShellService`].
    pub remote_shell: Arc<dyn RemoteShellService>,
    /// See [`DebugClient`].
    pub debug_client: Arc<dyn DebugClient>,
    /// See [`DispatchWaker`].
    pub dispatch_waker: Arc<dyn DispatchWaker>,
}
