//! Root service for a buildmaster coordinator.
//!
//! [`Coordinator`] owns the live component graph (`coordinator-runtime`),
//! drives it from a validated [`coordinator_core::ConfigModel`]
//! (`coordinator-config`), and exposes the handful of entry points external
//! callers need: injecting changes and buildsets, and subscribing to the
//! three buses changes, buildset additions and buildset completions publish
//! on. [`Control`] is a narrow façade over those entry points for callers
//! that shouldn't see the rest of the `Coordinator` surface.
//!
//! This crate is also the embedder: `stub_collaborators` wires default
//! (logging-only) implementations of the out-of-scope worker-facing
//! collaborators, and `bin/coordinatord` (see `main.rs`) is the process
//! entry point that ties `ConfigLoader`, a `Coordinator`, and signal
//! handling together into a running service.

#![deny(missing_docs)]

pub mod error;
pub mod stub_collaborators;

pub use error::Error;

use coordinator_config::ConfigLoader;
use coordinator_core::model::ConfigModel;
use coordinator_core::{Buildset, BuildResult, BuildsetCompletion, Change, MasterIdentity, NewBuildset, NewChange};
use coordinator_runtime::{Buses, Collaborators, LiveGraph, Reconciler, SubscriptionBus, SubscriptionHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A read-only snapshot of one live builder, returned by [`Control::get_builder`].
///
/// The full `Builder` live in `coordinator-runtime` carries collaborator
/// state this crate doesn't want to expose wholesale; this is the subset an
/// interactive caller plausibly wants (what `BuilderControl` would wrap, in
/// an embedder that implements interactive builder control — out of scope here).
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderHandle {
    /// Builder name.
    pub name: String,
    /// Build directory.
    pub build_dir: String,
    /// Scheduler-routing category, if any.
    pub category: Option<String>,
    /// Slave names currently attached.
    pub attached_slaves: Vec<String>,
}

/// The coordinator service: owns the live component graph and reconciles it
/// against whatever [`ConfigModel`] the most recent successful load produced.
///
/// Construction takes an already-computed [`MasterIdentity`] (see the
/// process layout this crate's specification describes — hostname, basedir,
/// pid and boot time are captured once, by the caller, typically `main`) and
/// a bundle of external [`Collaborators`]. Nothing starts until
/// [`Coordinator::start`] is called.
pub struct Coordinator {
    identity: MasterIdentity,
    config_path: PathBuf,
    reconciler: Reconciler,
    graph: Mutex<LiveGraph>,
    model: Mutex<Option<ConfigModel>>,
    changes: SubscriptionBus<Change>,
    buildset_additions: SubscriptionBus<(i64, Buildset)>,
    buildset_completion: SubscriptionBus<BuildsetCompletion>,
}

impl Coordinator {
    /// Build a coordinator rooted at `config_path`, over `collaborators`.
    /// The config is not loaded yet — call [`Coordinator::start`].
    pub fn new(identity: MasterIdentity, config_path: impl Into<PathBuf>, collaborators: Collaborators) -> Self {
        let changes = SubscriptionBus::new();
        let buildset_additions = SubscriptionBus::new();
        let buildset_completion = SubscriptionBus::new();
        let buses = Buses {
            changes: changes.clone(),
            buildset_additions: buildset_additions.clone(),
            buildset_completion: buildset_completion.clone(),
        };
        Coordinator {
            identity,
            config_path: config_path.into(),
            reconciler: Reconciler::new(collaborators, buses),
            graph: Mutex::new(LiveGraph::new()),
            model: Mutex::new(None),
            changes,
            buildset_additions,
            buildset_completion,
        }
    }

    /// This coordinator's identity, as captured at construction.
    pub fn identity(&self) -> &MasterIdentity {
        &self.identity
    }

    /// Start the coordinator: load the configuration if it hasn't been
    /// loaded yet, then — once, on this first successful load only — emit a
    /// "master started" point event on every builder's status handle.
    ///
    /// A failed initial load is logged and swallowed, not propagated: the
    /// coordinator proceeds with an empty component graph rather than
    /// aborting startup, matching `loadTheConfigFile`'s own "the new config
    /// file is unusable ... I will keep using the previous configuration
    /// instead" behavior — here, since there is no previous configuration
    /// on a first boot, "previous" is simply empty. The operator can retry
    /// by fixing the artifact and sending a hangup signal.
    pub async fn start(&self) -> Result<(), Error> {
        let first_boot = self.model.lock().await.is_none();
        if first_boot {
            match self.reload().await {
                Ok(()) => {
                    let graph = self.graph.lock().await;
                    for target in graph.status_targets.values() {
                        for name in graph.builders.keys() {
                            target.builder_point_event(name, &["master", "started"]);
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "initial configuration load failed; starting with an empty component graph");
                }
            }
        }
        Ok(())
    }

    /// Re-read the configuration artifact and reconcile the live graph
    /// against it. On any error the live graph is left exactly as it was —
    /// see the reconciler's no-partial-apply guarantee.
    pub async fn reload(&self) -> Result<(), Error> {
        tracing::info!(
            path = %self.config_path.display(),
            version = env!("CARGO_PKG_VERSION"),
            "loading configuration"
        );
        let previous = self.model.lock().await.clone();
        let model = ConfigLoader::load(&self.config_path, previous.as_ref())?;
        {
            let mut graph = self.graph.lock().await;
            self.reconciler.reconcile(&mut graph, &model).await?;
        }
        *self.model.lock().await = Some(model);
        Ok(())
    }

    /// Install a handler that defers a reload onto the runtime whenever this
    /// process receives a hang-up signal, rather than reloading inline. Only
    /// available on platforms that expose `SIGHUP`.
    #[cfg(unix)]
    pub fn spawn_reload_on_hangup(self: Arc<Self>) -> Result<tokio::task::JoinHandle<()>, Error> {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangups = signal(SignalKind::hangup()).map_err(Error::SignalInstall)?;
        Ok(tokio::spawn(async move {
            loop {
                if hangups.recv().await.is_none() {
                    break;
                }
                tracing::info!("received hangup; reloading configuration");
                if let Err(error) = self.reload().await {
                    tracing::error!(%error, "configuration reload failed; previous configuration stays live");
                }
            }
        }))
    }

    /// Write `new_change` to the database and return it with its assigned
    /// `changeid`. If this coordinator is not polling the database on a
    /// timer (`db_poll_interval` unset), the change is also delivered on the
    /// changes bus directly; otherwise the poller will discover and deliver
    /// it on its next tick, same as a peer coordinator's writes.
    pub async fn add_change(&self, new_change: NewChange) -> Result<Change, Error> {
        let db = self.database().await?;
        let change = db.insert_change(new_change).await?;
        let poll_driven = self
            .model
            .lock()
            .await
            .as_ref()
            .is_some_and(|m| m.db_poll_interval.is_some());
        if !poll_driven {
            self.changes.deliver(&change);
        }
        Ok(change)
    }

    /// Write `new_buildset` to the database and deliver `(bsid, Buildset)` on
    /// the buildset-additions bus.
    pub async fn add_buildset(&self, new_buildset: NewBuildset) -> Result<i64, Error> {
        let db = self.database().await?;
        let bsid = db.insert_buildset(new_buildset.clone()).await?;
        let buildset = Buildset {
            bsid,
            reason: new_buildset.reason,
            builder_names: new_buildset.builder_names,
            properties: new_buildset.properties,
            external_idstring: new_buildset.external_idstring,
        };
        self.buildset_additions.deliver(&(bsid, buildset));
        Ok(bsid)
    }

    /// Deliver a buildset completion on the completion bus. Local only —
    /// peer coordinators learn of a buildset's completion by observing
    /// database state themselves, not from this call.
    pub fn buildset_complete(&self, bsid: i64, result: BuildResult) {
        self.buildset_completion.deliver(&BuildsetCompletion { bsid, result });
    }

    /// Subscribe to every change, whether injected locally or discovered by
    /// the poller.
    pub fn subscribe_to_changes(&self, observer: impl Fn(&Change) + Send + Sync + 'static) -> SubscriptionHandle<Change> {
        self.changes.subscribe(observer)
    }

    /// Subscribe to newly created buildsets.
    pub fn subscribe_to_buildsets(
        &self,
        observer: impl Fn(&(i64, Buildset)) + Send + Sync + 'static,
    ) -> SubscriptionHandle<(i64, Buildset)> {
        self.buildset_additions.subscribe(observer)
    }

    /// Subscribe to buildset completions.
    pub fn subscribe_to_buildset_completions(
        &self,
        observer: impl Fn(&BuildsetCompletion) + Send + Sync + 'static,
    ) -> SubscriptionHandle<BuildsetCompletion> {
        self.buildset_completion.subscribe(observer)
    }

    async fn database(&self) -> Result<Arc<dyn coordinator_db::DbConnector>, Error> {
        self.graph
            .lock()
            .await
            .db
            .clone()
            .ok_or_else(|| Error::Core(coordinator_core::Error::DatabaseNotReady("no database attached yet".into())))
    }
}

/// Adapts a [`Coordinator`] for callers that should see only `addChange`,
/// `addBuildset` and `getBuilder` — narrower than the full `Coordinator`
/// surface (which also owns reload and subscription management). Built by
/// direct construction rather than an adapter registration (see the
/// redesign notes on `IControl`).
pub struct Control {
    coordinator: Arc<Coordinator>,
}

impl Control {
    /// Wrap `coordinator` in a `Control` façade.
    pub fn wrap(coordinator: Arc<Coordinator>) -> Self {
        Control { coordinator }
    }

    /// See [`Coordinator::add_change`].
    pub async fn add_change(&self, new_change: NewChange) -> Result<Change, Error> {
        self.coordinator.add_change(new_change).await
    }

    /// See [`Coordinator::add_buildset`].
    pub async fn add_buildset(&self, new_buildset: NewBuildset) -> Result<i64, Error> {
        self.coordinator.add_buildset(new_buildset).await
    }

    /// A snapshot of the named builder, if it's currently live.
    pub async fn get_builder(&self, name: &str) -> Option<BuilderHandle> {
        let graph = self.coordinator.graph.lock().await;
        graph.builders.get(name).map(|b| BuilderHandle {
            name: b.spec.name.clone(),
            build_dir: b.spec.build_dir.clone(),
            category: b.spec.category.clone(),
            attached_slaves: b.attached_slaves.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_config(dir: &std::path::Path, text: &str) -> PathBuf {
        let path = dir.join("master.cfg");
        std::fs::write(&path, text).unwrap();
        path
    }

    fn identity() -> MasterIdentity {
        MasterIdentity::new("build01", "/tmp/does-not-matter", 4242, 1_700_000_000)
    }

    // S1: a minimal config with one slave, one builder and one scheduler
    // loads successfully and the builder shows up in the live graph.
    #[tokio::test]
    async fn initial_load_succeeds_and_populates_builders() {
        let dir = tempdir();
        let path = write_config(
            dir.path(),
            r#"
                slave_portnum = 9989

                [[slaves]]
                name = "s1"

                [[builders]]
                name = "b1"
                slave_names = ["s1"]

                [[schedulers]]
                name = "all"
                builder_names = ["b1"]
                kind = "any-branch"
            "#,
        );
        let coordinator = Coordinator::new(identity(), path, stub_collaborators::default_collaborators(dir.path()));
        coordinator.start().await.unwrap();
        let control = Control::wrap(Arc::new(coordinator));
        let builder = control.get_builder("b1").await.unwrap();
        assert_eq!(builder.build_dir, "b1");
    }

    // S2: a config with two builders sharing a name fails the load. Per
    // §7, a first-boot load failure is logged and swallowed rather than
    // propagated — `start()` still returns `Ok`, but the component graph
    // stays empty since there is no previous configuration to fall back to.
    #[tokio::test]
    async fn duplicate_builder_name_rejected() {
        let dir = tempdir();
        let path = write_config(
            dir.path(),
            r#"
                slave_portnum = 9989
                schedulers = []

                [[slaves]]
                name = "s1"

                [[builders]]
                name = "b1"
                slave_names = ["s1"]

                [[builders]]
                name = "b1"
                slave_names = ["s1"]
            "#,
        );
        let coordinator = Coordinator::new(identity(), path, stub_collaborators::default_collaborators(dir.path()));
        coordinator.start().await.unwrap();
        let control = Control::wrap(Arc::new(coordinator));
        assert!(control.get_builder("b1").await.is_none());
    }

    // S4: addChange fans out to every subscriber, in subscription order,
    // without a database poll interval configured.
    #[tokio::test]
    async fn add_change_delivers_to_subscribers_in_order() {
        let dir = tempdir();
        let path = write_config(
            dir.path(),
            r#"
                slave_portnum = 9989
                builders = []
                schedulers = []

                [[slaves]]
                name = "s1"
            "#,
        );
        let coordinator = Arc::new(Coordinator::new(
            identity(),
            path,
            stub_collaborators::default_collaborators(dir.path()),
        ));
        coordinator.start().await.unwrap();

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        coordinator.subscribe_to_changes(move |_| o1.lock().push(1));
        coordinator.subscribe_to_changes(move |_| o2.lock().push(2));

        coordinator
            .add_change(NewChange {
                who: "alice".into(),
                comments: "fix the thing".into(),
                when: 1_700_000_000,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn add_buildset_delivers_with_assigned_bsid() {
        let dir = tempdir();
        let path = write_config(
            dir.path(),
            r#"
                slave_portnum = 9989
                builders = []
                schedulers = []

                [[slaves]]
                name = "s1"
            "#,
        );
        let coordinator = Arc::new(Coordinator::new(
            identity(),
            path,
            stub_collaborators::default_collaborators(dir.path()),
        ));
        coordinator.start().await.unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        coordinator.subscribe_to_buildsets(move |(bsid, _)| {
            s.store(*bsid as usize, Ordering::SeqCst);
        });

        let bsid = coordinator
            .add_buildset(NewBuildset {
                reason: Some("manual".into()),
                builder_names: vec![],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(bsid, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    use tempfile::tempdir;
}
