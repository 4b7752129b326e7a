//! [`ConfigModel`]: the validated, normalised configuration the reconciler consumes.
//!
//! Everything in this module is plain data — construction goes through
//! `coordinator-config::ConfigLoader`, which is the only place the invariants
//! in the specification are actually enforced. A [`ConfigModel`] that exists
//! has already passed validation.

use crate::LockId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Slave names that may never be used for an actual slave, because they
/// double as names for other subsystems in the status/debug surface.
pub const RESERVED_SLAVE_NAMES: &[&str] = &["debug", "change", "status"];

/// Log compression algorithm for a builder's stored logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LogCompressionMethod {
    /// bzip2.
    Bz2,
    /// gzip.
    Gz,
}

impl Default for LogCompressionMethod {
    fn default() -> Self {
        LogCompressionMethod::Bz2
    }
}

/// Global caps and retention horizons, applied to a builder unless it
/// overrides them individually.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlobalCaps {
    /// How many events of build history to retain per builder.
    pub event_horizon: u32,
    /// How many logs to retain per builder, if capped.
    pub log_horizon: Option<u32>,
    /// How many builds to retain per builder, if capped.
    pub build_horizon: Option<u32>,
    /// How many changes to retain, if capped.
    pub change_horizon: Option<u32>,
    /// In-memory build cache size, if capped.
    pub build_cache_size: Option<u32>,
    /// In-memory change cache size, if capped. See the open question about
    /// whether this is honoured (it is currently rejected, see
    /// [`crate::error::ConfigSchemaError`] callers in `coordinator-config`).
    pub change_cache_size: Option<u32>,
    /// Logs larger than this many bytes are compressed.
    pub log_compression_limit: u32,
    /// Compression algorithm used once a log crosses `log_compression_limit`.
    pub log_compression_method: LogCompressionMethod,
    /// Hard cap on stored log size, if any.
    pub log_max_size: Option<u32>,
    /// Hard cap on the tail retained once `log_max_size` truncates a log.
    pub log_max_tail_size: Option<u32>,
}

impl Default for GlobalCaps {
    fn default() -> Self {
        GlobalCaps {
            event_horizon: 50,
            log_horizon: None,
            build_horizon: None,
            change_horizon: None,
            build_cache_size: None,
            change_cache_size: None,
            log_compression_limit: 4 * 1024,
            log_compression_method: LogCompressionMethod::default(),
            log_max_size: None,
            log_max_tail_size: None,
        }
    }
}

/// Project identity surfaced by status targets and web dashboards (neither of
/// which this crate implements — see the out-of-scope collaborators).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectIdentity {
    /// Human-readable project name.
    pub name: Option<String>,
    /// Project homepage.
    pub url: Option<String>,
    /// Externally-reachable URL for this buildmaster's own status pages.
    pub external_url: Option<String>,
}

/// A declared remote worker agent. The slave registry itself (accepting PB
/// connections, tracking liveness) is an external collaborator; this is only
/// the declaration the config contributes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SlaveSpec {
    /// Unique, non-reserved slave name.
    pub name: String,
}

/// A reference to a domain lock from a builder or a build-factory step.
///
/// Two `LockRef`s with the same `name` must carry the same `id` — that's the
/// "lock identity" invariant from the specification. The id is assigned by
/// whichever part of the artifact constructs the lock first; the loader
/// rejects a load where the same name resolves to two different ids.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LockRef {
    /// The lock's name, as used for uniqueness checks.
    pub name: String,
    /// The lock's identity.
    pub id: LockId,
}

/// One step of a builder's build factory. All we track at this layer is the
/// step's name and the locks it claims — step execution itself belongs to the
/// worker-side builder runtime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BuildStepSpec {
    /// Step name, surfaced in status.
    pub name: String,
    /// Locks claimed while this step runs.
    pub locks: Vec<LockRef>,
}

/// A builder's build factory: the ordered steps a build runs through.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BuildFactorySpec {
    /// Steps, in execution order.
    pub steps: Vec<BuildStepSpec>,
}

/// A named, normalised builder declaration.
///
/// `PartialEq` on this type is exactly `compareToSetup`/"did this builder's
/// setup change": the reconciler diffs old vs. new specs field-by-field and
/// only replaces a `Builder` when they differ.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BuilderSpec {
    /// Unique, non-underscore-prefixed builder name.
    pub name: String,
    /// Build directory, unique across all builders. Defaults to
    /// `safe_translate(name)` if the artifact didn't set one.
    pub build_dir: String,
    /// Build directory as seen by the slave; defaults to `build_dir`.
    pub slave_build_dir: String,
    /// Names of slaves that may execute this builder's builds. Each must
    /// resolve to a declared [`SlaveSpec`].
    pub slave_names: Vec<String>,
    /// Optional scheduler-routing category.
    pub category: Option<String>,
    /// Per-builder override of the global event horizon.
    pub event_horizon: u32,
    /// Per-builder override of the global log horizon.
    pub log_horizon: Option<u32>,
    /// Per-builder override of the global build horizon.
    pub build_horizon: Option<u32>,
    /// Locks claimed directly by the builder (as opposed to by a step).
    pub locks: Vec<LockRef>,
    /// The build factory whose steps may themselves claim locks.
    pub factory: BuildFactorySpec,
}

/// A named scheduler declaration. Concrete scheduling algorithms are an
/// external collaborator; this only records which builders it may dispatch
/// to and lets validation check those references exist.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerSpec {
    /// Unique scheduler name.
    pub name: String,
    /// Builder names this scheduler is permitted to request builds on.
    /// Must resolve to declared builders unless `multi_master` is set.
    pub builder_names: Vec<String>,
    /// Opaque algorithm identifier (e.g. `"single-branch"`), resolved by the
    /// embedder's scheduler registry.
    pub kind: String,
}

/// A named change-source declaration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChangeSourceSpec {
    /// Unique change-source name.
    pub name: String,
    /// Opaque kind identifier, resolved by the embedder's change-source registry.
    pub kind: String,
}

/// A named status-target declaration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusTargetSpec {
    /// Unique status-target name.
    pub name: String,
    /// Opaque kind identifier, resolved by the embedder's status-target registry.
    pub kind: String,
}

/// The remote-shell ("manhole"/debug access) endpoint, if configured.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RemoteShellSpec {
    /// Listener endpoint spec, e.g. `"tcp:9999"`.
    pub endpoint: String,
}

/// Decision hook invoked to decide whether two pending build requests for the
/// same builder should be merged into one build. Represented as a name into
/// an embedder-supplied registry rather than a literal closure, because the
/// configuration artifact is data, not executable code (see the redesign
/// notes on duck-typed callables becoming explicit interfaces).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MergeRequestsPolicy {
    /// Use the builder runtime's own default merging behaviour.
    Default,
    /// Never merge requests.
    Disabled,
    /// Look up a named policy in the embedder's hook registry.
    Named(String),
}

/// Decision hook invoked to order pending builds across builders. Same
/// name-into-registry shape as [`MergeRequestsPolicy`], for the same reason.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PrioritizeBuildersPolicy {
    /// Use the builder runtime's own default ordering.
    Default,
    /// Look up a named policy in the embedder's hook registry.
    Named(String),
}

/// The validated, normalised configuration. Immutable once built: a
/// reconfiguration produces an entirely new `ConfigModel` rather than
/// mutating one in place.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfigModel {
    /// Project identity.
    pub project: ProjectIdentity,
    /// Worker-listener endpoint, e.g. `"tcp:9989"`.
    pub worker_listener: String,
    /// Declared slaves.
    pub slaves: Vec<SlaveSpec>,
    /// Declared builders.
    pub builders: Vec<BuilderSpec>,
    /// Declared schedulers.
    pub schedulers: Vec<SchedulerSpec>,
    /// Declared change sources.
    pub change_sources: Vec<ChangeSourceSpec>,
    /// Declared status targets.
    pub status_targets: Vec<StatusTargetSpec>,
    /// User-supplied global properties, visible to every build.
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Global caps and horizons.
    pub caps: GlobalCaps,
    /// Request-merging policy, if any.
    pub merge_requests: Option<MergeRequestsPolicy>,
    /// Builder-prioritisation policy, if any.
    pub prioritize_builders: Option<PrioritizeBuildersPolicy>,
    /// Database connection URL. Write-once: cannot change across reconfigurations
    /// once a config has been successfully loaded.
    pub db_url: String,
    /// Database poll interval, seconds. Write-once, same as `db_url`. `None`
    /// means this coordinator is not participating in multi-master polling.
    pub db_poll_interval: Option<u64>,
    /// Whether this coordinator is part of a multi-master deployment sharing
    /// one database (relaxes the scheduler → builder reference check).
    pub multi_master: bool,
    /// Debug client password, if the debug surface is enabled.
    pub debug_password: Option<String>,
    /// Remote-shell endpoint, if configured.
    pub remote_shell: Option<RemoteShellSpec>,
}

impl ConfigModel {
    /// Look up a builder spec by name.
    pub fn builder(&self, name: &str) -> Option<&BuilderSpec> {
        self.builders.iter().find(|b| b.name == name)
    }

    /// Look up a slave spec by name.
    pub fn slave(&self, name: &str) -> Option<&SlaveSpec> {
        self.slaves.iter().find(|s| s.name == name)
    }
}

/// An embedder-supplied lookup of named merge/prioritize hooks, resolved
/// while applying a [`ConfigModel`]. Kept out of `ConfigModel` itself since
/// hooks are behaviour, not data, and `ConfigModel` must stay
/// `Clone + PartialEq + Serialize`.
pub trait MergeRequestsHook: Send + Sync {
    /// Decide whether `a` and `b`, both pending for the same builder, should
    /// be merged into a single build.
    fn should_merge(&self, a: &crate::Change, b: &crate::Change) -> bool;
}

/// See [`MergeRequestsHook`]; covers `prioritizeBuilders`.
pub trait PrioritizeBuildersHook: Send + Sync {
    /// Reorder `builders` in place, highest priority first.
    fn prioritize(&self, builders: &mut Vec<String>);
}

/// A registry the embedder populates with named hook implementations before
/// handing config loading to `coordinator-config`.
#[derive(Clone, Default)]
pub struct HookRegistry {
    merge: BTreeMap<String, Arc<dyn MergeRequestsHook>>,
    prioritize: BTreeMap<String, Arc<dyn PrioritizeBuildersHook>>,
}

impl HookRegistry {
    /// An empty registry: only `Default`/`Disabled` policies will resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named merge-requests hook.
    pub fn register_merge(&mut self, name: impl Into<String>, hook: Arc<dyn MergeRequestsHook>) {
        self.merge.insert(name.into(), hook);
    }

    /// Register a named prioritize-builders hook.
    pub fn register_prioritize(&mut self, name: impl Into<String>, hook: Arc<dyn PrioritizeBuildersHook>) {
        self.prioritize.insert(name.into(), hook);
    }

    /// Resolve a named merge-requests hook, if registered.
    pub fn merge(&self, name: &str) -> Option<Arc<dyn MergeRequestsHook>> {
        self.merge.get(name).cloned()
    }

    /// Resolve a named prioritize-builders hook, if registered.
    pub fn prioritize(&self, name: &str) -> Option<Arc<dyn PrioritizeBuildersHook>> {
        self.prioritize.get(name).cloned()
    }
}

/// Key a [`ObjectId`] is resolved under for the coordinator's own durable
/// scalar state (class-tag `"master"`, qualified name below).
pub const MASTER_OBJECT_CLASS_TAG: &str = "master";

/// Qualified name used to resolve this coordinator's own [`ObjectId`].
pub const MASTER_OBJECT_QUALIFIED_NAME: &str = "buildmaster_core::Coordinator";

/// Name the coordinator's durable `last_processed_change` mark is stored under.
pub const LAST_PROCESSED_CHANGE_KEY: &str = "last_processed_change";
