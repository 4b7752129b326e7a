//! Default collaborator implementations for the `coordinatord` binary.
//!
//! The worker-facing RPC transport, the builder runtime, concrete scheduler
//! algorithms and status rendering are all external collaborators this crate
//! only defines a seam for (see [`coordinator_runtime::collaborators`]).
//! These implementations log what the reconciler asked them to do and
//! otherwise no-op; an embedder wiring a real worker pool, scheduler engine
//! or status backend replaces them with real [`Collaborators`] before
//! constructing a [`crate::Coordinator`]. The one collaborator that isn't a
//! stub is [`SqliteDbConnectorFactory`] — the database is in scope here.

use async_trait::async_trait;
use coordinator_core::model::{
    BuilderSpec, ChangeSourceSpec, RemoteShellSpec, SchedulerSpec, SlaveSpec, StatusTargetSpec,
};
use coordinator_core::traits::{ChangeSource, Lifecycle, StatusTarget};
use coordinator_core::{Change, Error, MasterIdentity};
use coordinator_db::DbConnector;
use coordinator_runtime::collaborators::{
    ChangeSourceFactory, Collaborators, DbConnectorFactory, DebugClient, DispatchWaker, RemoteShellService,
    SchedulerRegistry, SlaveRegistry, StatusTargetFactory,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Opens (creating if necessary) a sqlite database under the coordinator's
/// base directory, per the `db_url` convention `coordinator_db::sqlite` implements.
pub struct SqliteDbConnectorFactory {
    basedir: PathBuf,
}

impl SqliteDbConnectorFactory {
    /// A factory rooted at `basedir`, used to resolve relative `db_url`s.
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        SqliteDbConnectorFactory { basedir: basedir.into() }
    }
}

#[async_trait]
impl DbConnectorFactory for SqliteDbConnectorFactory {
    async fn connect(&self, db_url: &str) -> Result<Arc<dyn DbConnector>, Error> {
        let path = coordinator_db::sqlite::sqlite_path(db_url, &self.basedir)?;
        let connector = coordinator_db::SqliteConnector::open(&path).await?;
        Ok(Arc::new(connector))
    }
}

/// Logs slave/builder topology changes instead of tracking real connections.
pub struct LoggingSlaveRegistry;

impl SlaveRegistry for LoggingSlaveRegistry {
    fn set_identity(&self, identity: &MasterIdentity) {
        tracing::info!(master = %identity.master_name(), incarnation = %identity.incarnation(), "slave registry identity set");
    }

    fn refresh_slaves(&self, slaves: &[SlaveSpec]) {
        tracing::info!(count = slaves.len(), "slave set refreshed");
    }

    fn refresh_builders(&self, builders: &[BuilderSpec]) {
        tracing::info!(count = builders.len(), "builder topology refreshed");
    }
}

/// Accepts any scheduler set without actually scheduling anything.
pub struct LoggingSchedulerRegistry;

#[async_trait]
impl SchedulerRegistry for LoggingSchedulerRegistry {
    async fn reconcile(&self, specs: &[SchedulerSpec]) -> Result<(), Error> {
        for spec in specs {
            tracing::info!(scheduler = %spec.name, kind = %spec.kind, "scheduler reconciled (stub)");
        }
        Ok(())
    }
}

struct LoggingChangeSource {
    name: String,
    kind: String,
}

#[async_trait]
impl Lifecycle for LoggingChangeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), Error> {
        tracing::info!(name = %self.name, kind = %self.kind, "change source started (stub)");
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        tracing::info!(name = %self.name, "change source stopped (stub)");
        Ok(())
    }
}

#[async_trait]
impl ChangeSource for LoggingChangeSource {
    fn kind(&self) -> &str {
        &self.kind
    }
}

/// Builds [`LoggingChangeSource`]s. A real ingress (polling a VCS, an
/// incoming webhook listener) goes through `Coordinator::add_change` instead
/// of anything this factory constructs.
pub struct LoggingChangeSourceFactory;

impl ChangeSourceFactory for LoggingChangeSourceFactory {
    fn build(&self, spec: &ChangeSourceSpec) -> Arc<dyn ChangeSource> {
        Arc::new(LoggingChangeSource {
            name: spec.name.clone(),
            kind: spec.kind.clone(),
        })
    }
}

struct LoggingStatusTarget {
    name: String,
}

#[async_trait]
impl Lifecycle for LoggingStatusTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), Error> {
        tracing::info!(name = %self.name, "status target started (stub)");
        Ok(())
    }

    async fn stop(&self) -> Result<(), Error> {
        tracing::info!(name = %self.name, "status target stopped (stub)");
        Ok(())
    }
}

impl StatusTarget for LoggingStatusTarget {
    fn change_added(&self, change: &Change) {
        tracing::info!(target = %self.name, changeid = change.changeid, "change");
    }

    fn builder_added(&self, name: &str, build_dir: &str, category: Option<&str>) {
        tracing::info!(target = %self.name, builder = name, build_dir, category, "builder added");
    }

    fn builder_removed(&self, name: &str) {
        tracing::info!(target = %self.name, builder = name, "builder removed");
    }

    fn builder_point_event(&self, name: &str, tags: &[&str]) {
        tracing::info!(target = %self.name, builder = name, tags = ?tags, "builder point event");
    }

    fn refresh_log_caps(&self, name: &str, caps: &coordinator_core::model::GlobalCaps) {
        tracing::debug!(
            target = %self.name,
            builder = name,
            log_compression_limit = caps.log_compression_limit,
            log_max_size = ?caps.log_max_size,
            "log caps refreshed"
        );
    }
}

/// Builds [`LoggingStatusTarget`]s — a console-style status reporter with no
/// persistence or rendering, standing in for the web dashboards and webhooks
/// this crate doesn't implement.
pub struct LoggingStatusTargetFactory;

impl StatusTargetFactory for LoggingStatusTargetFactory {
    fn build(&self, spec: &StatusTargetSpec) -> Arc<dyn StatusTarget> {
        Arc::new(LoggingStatusTarget { name: spec.name.clone() })
    }
}

/// No remote shell is actually opened; attach/detach are logged only.
pub struct LoggingRemoteShellService;

#[async_trait]
impl RemoteShellService for LoggingRemoteShellService {
    async fn detach(&self) -> Result<(), Error> {
        tracing::info!("remote shell detached (stub)");
        Ok(())
    }

    async fn attach(&self, spec: &RemoteShellSpec) -> Result<(), Error> {
        tracing::info!(endpoint = %spec.endpoint, "remote shell attached (stub)");
        Ok(())
    }
}

/// No debug credential is actually registered against the worker listener.
pub struct LoggingDebugClient;

#[async_trait]
impl DebugClient for LoggingDebugClient {
    async fn unregister(&self) -> Result<(), Error> {
        tracing::info!("debug client unregistered (stub)");
        Ok(())
    }

    async fn register(&self, _password: &str, worker_listener_endpoint: &str) -> Result<(), Error> {
        tracing::info!(endpoint = %worker_listener_endpoint, "debug client registered (stub)");
        Ok(())
    }
}

/// The build-dispatch loop itself belongs to the builder runtime; this only
/// logs that a wake was requested.
pub struct LoggingDispatchWaker;

impl DispatchWaker for LoggingDispatchWaker {
    fn wake(&self) {
        tracing::trace!("dispatch loop woken");
    }
}

/// A full [`Collaborators`] bundle of the stubs above, rooted at `basedir`
/// for the one real collaborator (the sqlite connector).
pub fn default_collaborators(basedir: impl Into<PathBuf>) -> Collaborators {
    Collaborators {
        db: Arc::new(SqliteDbConnectorFactory::new(basedir)),
        slaves: Arc::new(LoggingSlaveRegistry),
        schedulers: Arc::new(LoggingSchedulerRegistry),
        change_sources: Arc::new(LoggingChangeSourceFactory),
        status_targets: Arc::new(LoggingStatusTargetFactory),
        remote_shell: Arc::new(LoggingRemoteShellService),
        debug_client: Arc::new(LoggingDebugClient),
        dispatch_waker: Arc::new(LoggingDispatchWaker),
    }
}
