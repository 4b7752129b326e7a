//! Applies a [`ConfigModel`] to the live component graph with minimal
//! disruption.
//!
//! The eight steps below run as a fixed, ordered pipeline — step *k*+1 only
//! starts once step *k*'s future resolves — matching the original's
//! deferred-chain control flow without reproducing the callback-chaining
//! idiom itself (see the redesign notes on expressing that as a direct
//! sequence of `async` steps).

use crate::bus::SubscriptionBus;
use crate::collaborators::Collaborators;
use crate::livegraph::{Builder, LiveGraph};
use crate::poller::ChangePoller;
use crate::statestore::StateStore;
use coordinator_core::model::{ConfigModel, MASTER_OBJECT_CLASS_TAG, MASTER_OBJECT_QUALIFIED_NAME};
use coordinator_core::{Buildset, Change, Error};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Buses a fully-wired coordinator publishes on. The reconciler only ever
/// reads these to wire up observers in step 1; publishing is the
/// coordinator's job.
pub struct Buses {
    /// Changes, whether injected locally or discovered by the poller.
    pub changes: SubscriptionBus<Change>,
    /// Newly created buildsets, `(bsid, Buildset)`.
    pub buildset_additions: SubscriptionBus<(i64, Buildset)>,
    /// Buildset completions.
    pub buildset_completion: SubscriptionBus<coordinator_core::BuildsetCompletion>,
}

/// Applies [`ConfigModel`]s to a [`LiveGraph`].
pub struct Reconciler {
    collaborators: Collaborators,
    buses: Buses,
}

impl Reconciler {
    /// Build a reconciler over the given collaborators and buses. The buses
    /// are owned by the coordinator and shared here only so step 1 can
    /// attach bus-dependent observers once the database is up.
    pub fn new(collaborators: Collaborators, buses: Buses) -> Self {
        Reconciler { collaborators, buses }
    }

    /// Run the full eight-step pipeline against `graph`, applying `model`.
    /// On any error, `graph` is left exactly as it was before this call —
    /// there is no partial apply.
    pub async fn reconcile(&self, graph: &mut LiveGraph, model: &ConfigModel) -> Result<(), Error> {
        let mut staged = graph.clone_shallow();
        // Timers are never cloned (they're not `Clone`); carry the running
        // ones forward explicitly so the final `*graph = staged` assignment
        // — which drops the old graph, aborting whatever timers it still
        // holds — doesn't kill a poller that isn't being replaced.
        staged.timers = std::mem::take(&mut graph.timers);

        self.step1_database(&mut staged, model).await?;
        self.step2_slaves(model);
        self.step3_remote_shell(&mut staged, model).await?;
        self.step4_builders(&mut staged, model);
        self.step5_status_targets(&mut staged, model).await?;
        self.step6_schedulers(model).await?;
        self.step7_change_sources(&mut staged, model).await?;
        self.step8_debug_client(&mut staged, model).await?;

        staged.configured = true;
        *graph = staged;
        self.collaborators.dispatch_waker.wake();
        Ok(())
    }

    async fn step1_database(&self, graph: &mut LiveGraph, model: &ConfigModel) -> Result<(), Error> {
        if graph.db.is_some() {
            return Ok(());
        }
        let connector = self.collaborators.db.connect(&model.db_url).await?;
        connector.start().await?;
        if !connector.is_current().await? {
            return Err(Error::DatabaseNotReady(
                "database schema is out of date; run the schema upgrade before starting this coordinator".into(),
            ));
        }
        let state = Arc::new(StateStore::new(connector.clone()));
        let master_objectid = state
            .get_object_id(MASTER_OBJECT_CLASS_TAG, MASTER_OBJECT_QUALIFIED_NAME)
            .await?;

        // status -> changes bus: every currently-known status target observes changes.
        for target in graph.status_targets.values() {
            let target = target.clone();
            self.buses.changes.subscribe(move |change: &Change| target.change_added(change));
        }
        // botmaster-wake -> new-buildset bus.
        let waker = self.collaborators.dispatch_waker.clone();
        self.buses.buildset_additions.subscribe(move |_| waker.wake());

        graph.db = Some(connector.clone());

        if let Some(interval_secs) = model.db_poll_interval {
            let poller = Arc::new(ChangePoller::new(
                connector,
                state,
                self.buses.changes.clone(),
                master_objectid,
            ));
            let poll_timer = spawn_interval(interval_secs, move || {
                let poller = poller.clone();
                async move {
                    if let Err(error) = poller.poll_once().await {
                        tracing::warn!(%error, "change poll failed; will retry next tick");
                    }
                }
            });
            let waker = self.collaborators.dispatch_waker.clone();
            let dispatch_timer = spawn_interval(interval_secs, move || {
                let waker = waker.clone();
                async move { waker.wake() }
            });
            graph.timers.push(poll_timer);
            graph.timers.push(dispatch_timer);
        }
        Ok(())
    }

    fn step2_slaves(&self, model: &ConfigModel) {
        self.collaborators.slaves.refresh_slaves(&model.slaves);
    }

    async fn step3_remote_shell(&self, graph: &mut LiveGraph, model: &ConfigModel) -> Result<(), Error> {
        if graph.remote_shell == model.remote_shell {
            return Ok(());
        }
        if graph.remote_shell.is_some() {
            self.collaborators.remote_shell.detach().await?;
        }
        if let Some(spec) = &model.remote_shell {
            self.collaborators.remote_shell.attach(spec).await?;
        }
        graph.remote_shell = model.remote_shell.clone();
        Ok(())
    }

    fn step4_builders(&self, graph: &mut LiveGraph, model: &ConfigModel) {
        let new_names: BTreeSet<&str> = model.builders.iter().map(|b| b.name.as_str()).collect();
        let removed: Vec<String> = graph
            .builders
            .keys()
            .filter(|name| !new_names.contains(name.as_str()))
            .cloned()
            .collect();

        let mut changed = !removed.is_empty();
        for name in removed {
            graph.builders.remove(&name);
            for target in graph.status_targets.values() {
                target.builder_removed(&name);
            }
        }

        for spec in &model.builders {
            match graph.builders.get(&spec.name) {
                None => {
                    for target in graph.status_targets.values() {
                        target.builder_added(&spec.name, &spec.build_dir, spec.category.as_deref());
                    }
                    graph.builders.insert(spec.name.clone(), Builder::new(spec.clone()));
                    changed = true;
                }
                Some(live) if live.spec != *spec => {
                    let old = graph.builders.remove(&spec.name).expect("just matched");
                    let mut replacement = Builder::new(spec.clone());
                    replacement.transfer_state(old);
                    for target in graph.status_targets.values() {
                        target.builder_point_event(&spec.name, &["config", "updated"]);
                    }
                    graph.builders.insert(spec.name.clone(), replacement);
                    changed = true;
                }
                Some(_) => {}
            }
        }

        // Independently of whether any builder was added, removed or
        // replaced above: re-apply the current global log caps to every
        // declared builder's status bookkeeping, so a reconfigure that
        // only changes e.g. `logCompressionLimit` still reaches builders
        // whose own spec didn't change (§4.5.1).
        for spec in &model.builders {
            for target in graph.status_targets.values() {
                target.refresh_log_caps(&spec.name, &model.caps);
            }
        }

        if changed {
            let ordered: Vec<_> = model.builders.clone();
            self.collaborators.slaves.refresh_builders(&ordered);
        }
    }

    async fn step5_status_targets(&self, graph: &mut LiveGraph, model: &ConfigModel) -> Result<(), Error> {
        let new_names: BTreeSet<&str> = model.status_targets.iter().map(|s| s.name.as_str()).collect();
        let removed: Vec<String> = graph
            .status_targets
            .keys()
            .filter(|name| !new_names.contains(name.as_str()))
            .cloned()
            .collect();
        for name in removed {
            if let Some(target) = graph.status_targets.remove(&name) {
                target.stop().await?;
            }
        }
        for spec in &model.status_targets {
            if graph.status_targets.contains_key(&spec.name) {
                continue;
            }
            let target = self.collaborators.status_targets.build(spec);
            target.start().await?;
            graph.status_targets.insert(spec.name.clone(), target);
        }
        Ok(())
    }

    async fn step6_schedulers(&self, model: &ConfigModel) -> Result<(), Error> {
        self.collaborators.schedulers.reconcile(&model.schedulers).await
    }

    async fn step7_change_sources(&self, graph: &mut LiveGraph, model: &ConfigModel) -> Result<(), Error> {
        let new_names: BTreeSet<&str> = model.change_sources.iter().map(|c| c.name.as_str()).collect();
        let removed: Vec<String> = graph
            .change_sources
            .keys()
            .filter(|name| !new_names.contains(name.as_str()))
            .cloned()
            .collect();
        for name in removed {
            if let Some(source) = graph.change_sources.remove(&name) {
                source.stop().await?;
            }
        }
        for spec in &model.change_sources {
            if graph.change_sources.contains_key(&spec.name) {
                continue;
            }
            let source = self.collaborators.change_sources.build(spec);
            source.start().await?;
            graph.change_sources.insert(spec.name.clone(), source);
        }
        Ok(())
    }

    async fn step8_debug_client(&self, graph: &mut LiveGraph, model: &ConfigModel) -> Result<(), Error> {
        if graph.debug_password == model.debug_password {
            return Ok(());
        }
        if graph.debug_password.is_some() {
            self.collaborators.debug_client.unregister().await?;
        }
        if let Some(password) = &model.debug_password {
            self.collaborators
                .debug_client
                .register(password, &model.worker_listener)
                .await?;
        }
        graph.debug_password = model.debug_password.clone();
        Ok(())
    }
}

fn spawn_interval<F, Fut>(interval_secs: u64, mut f: F) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            f().await;
        }
    })
}

impl LiveGraph {
    /// A shallow clone used to stage a reconfiguration: trait-object
    /// collaborators are `Arc`s and cheap to clone, and we only ever commit
    /// the staged copy back over `graph` once every step has succeeded.
    fn clone_shallow(&self) -> LiveGraph {
        LiveGraph {
            builders: self.builders.clone(),
            status_targets: self.status_targets.clone(),
            change_sources: self.change_sources.clone(),
            scheduler_names: self.scheduler_names.clone(),
            db: self.db.clone(),
            remote_shell: self.remote_shell.clone(),
            debug_password: self.debug_password.clone(),
            timers: Vec::new(),
            configured: self.configured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        ChangeSourceFactory, Collaborators, DbConnectorFactory, DebugClient, DispatchWaker, RemoteShellService,
        SchedulerRegistry, SlaveRegistry, StatusTargetFactory,
    };
    use async_trait::async_trait;
    use coordinator_core::model::{
        BuildFactorySpec, ChangeSourceSpec, GlobalCaps, ProjectIdentity, RemoteShellSpec, SchedulerSpec, SlaveSpec,
        StatusTargetSpec,
    };
    use coordinator_core::traits::{ChangeSource, Lifecycle, StatusTarget};
    use coordinator_core::MasterIdentity;
    use coordinator_db::memory::MemoryConnector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeDbFactory;

    #[async_trait]
    impl DbConnectorFactory for FakeDbFactory {
        async fn connect(&self, _db_url: &str) -> Result<Arc<dyn DbConnector>, Error> {
            Ok(Arc::new(MemoryConnector::new()))
        }
    }

    struct NoopSlaves;

    impl SlaveRegistry for NoopSlaves {
        fn set_identity(&self, _identity: &MasterIdentity) {}
        fn refresh_slaves(&self, _slaves: &[SlaveSpec]) {}
        fn refresh_builders(&self, _builders: &[BuilderSpec]) {}
    }

    struct NoopSchedulers;

    #[async_trait]
    impl SchedulerRegistry for NoopSchedulers {
        async fn reconcile(&self, _specs: &[SchedulerSpec]) -> Result<(), Error> {
            Ok(())
        }
    }

    struct NoopChangeSources;

    impl ChangeSourceFactory for NoopChangeSources {
        fn build(&self, spec: &ChangeSourceSpec) -> Arc<dyn ChangeSource> {
            struct Noop(String);

            #[async_trait]
            impl Lifecycle for Noop {
                fn name(&self) -> &str {
                    &self.0
                }
                async fn start(&self) -> Result<(), Error> {
                    Ok(())
                }
                async fn stop(&self) -> Result<(), Error> {
                    Ok(())
                }
            }

            #[async_trait]
            impl ChangeSource for Noop {
                fn kind(&self) -> &str {
                    "noop"
                }
            }

            Arc::new(Noop(spec.name.clone()))
        }
    }

    /// Records every `refresh_log_caps` call it receives, so a test can
    /// assert the reconciler invoked it even for a builder whose spec
    /// didn't change across a reconfiguration.
    #[derive(Default)]
    struct SpyStatusTarget {
        log_cap_calls: StdMutex<Vec<(String, u32)>>,
    }

    #[async_trait]
    impl Lifecycle for SpyStatusTarget {
        fn name(&self) -> &str {
            "spy"
        }
        async fn start(&self) -> Result<(), Error> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    impl StatusTarget for SpyStatusTarget {
        fn refresh_log_caps(&self, name: &str, caps: &GlobalCaps) {
            self.log_cap_calls.lock().unwrap().push((name.to_string(), caps.log_compression_limit));
        }
    }

    struct SpyStatusTargetFactory {
        target: Arc<SpyStatusTarget>,
    }

    impl StatusTargetFactory for SpyStatusTargetFactory {
        fn build(&self, _spec: &StatusTargetSpec) -> Arc<dyn StatusTarget> {
            self.target.clone()
        }
    }

    struct NoopRemoteShell;

    #[async_trait]
    impl RemoteShellService for NoopRemoteShell {
        async fn detach(&self) -> Result<(), Error> {
            Ok(())
        }
        async fn attach(&self, _spec: &RemoteShellSpec) -> Result<(), Error> {
            Ok(())
        }
    }

    struct NoopDebugClient;

    #[async_trait]
    impl DebugClient for NoopDebugClient {
        async fn unregister(&self) -> Result<(), Error> {
            Ok(())
        }
        async fn register(&self, _password: &str, _worker_listener_endpoint: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct NoopWaker {
        woken: AtomicUsize,
    }

    impl DispatchWaker for NoopWaker {
        fn wake(&self) {
            self.woken.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn builder_spec(name: &str) -> BuilderSpec {
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

    fn base_model(log_compression_limit: u32) -> ConfigModel {
        ConfigModel {
            project: ProjectIdentity::default(),
            worker_listener: "tcp:9989".into(),
            slaves: vec![],
            builders: vec![builder_spec("b1")],
            schedulers: vec![],
            change_sources: vec![],
            status_targets: vec![StatusTargetSpec { name: "status1".into(), kind: "noop".into() }],
            properties: Default::default(),
            caps: GlobalCaps { log_compression_limit, ..GlobalCaps::default() },
            merge_requests: None,
            prioritize_builders: None,
            db_url: "sqlite:///db".into(),
            db_poll_interval: None,
            multi_master: false,
            debug_password: None,
            remote_shell: None,
        }
    }

    fn reconciler_with_spy(spy: Arc<SpyStatusTarget>) -> Reconciler {
        let collaborators = Collaborators {
            db: Arc::new(FakeDbFactory),
            slaves: Arc::new(NoopSlaves),
            schedulers: Arc::new(NoopSchedulers),
            change_sources: Arc::new(NoopChangeSources),
            status_targets: Arc::new(SpyStatusTargetFactory { target: spy }),
            remote_shell: Arc::new(NoopRemoteShell),
            debug_client: Arc::new(NoopDebugClient),
            dispatch_waker: Arc::new(NoopWaker::default()),
        };
        let buses = Buses {
            changes: SubscriptionBus::new(),
            buildset_additions: SubscriptionBus::new(),
            buildset_completion: SubscriptionBus::new(),
        };
        Reconciler::new(collaborators, buses)
    }

    #[tokio::test]
    async fn unchanged_builder_still_gets_log_caps_refreshed_on_reconfigure() {
        let spy = Arc::new(SpyStatusTarget::default());
        let reconciler = reconciler_with_spy(spy.clone());
        let mut graph = LiveGraph::new();

        let first = base_model(1_000_000);
        reconciler.reconcile(&mut graph, &first).await.unwrap();
        assert!(spy.log_cap_calls.lock().unwrap().contains(&("b1".to_string(), 1_000_000)));

        // b1's own BuilderSpec is identical; only the global cap changes.
        let second = base_model(2_000_000);
        assert_eq!(second.builder("b1"), first.builder("b1"));
        reconciler.reconcile(&mut graph, &second).await.unwrap();

        assert!(
            spy.log_cap_calls.lock().unwrap().contains(&("b1".to_string(), 2_000_000)),
            "refresh_log_caps must run for every declared builder on every reconfiguration, \
             not just ones whose own spec changed"
        );
    }
}
