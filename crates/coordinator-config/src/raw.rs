//! The as-parsed shape of the configuration artifact, before validation.
//!
//! This mirrors `BuildmasterConfig`'s recognised keys (see the external
//! interfaces section of the spec this loader implements). Everything here
//! is optional or defaulted; [`crate::validate::validate`] is what turns this
//! into a [`coordinator_core::ConfigModel`] and is where the real invariants live.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Every key the loader recognises. Anything else present in the artifact is
/// a warning, not an error — except the explicitly deprecated keys below.
pub const KNOWN_KEYS: &[&str] = &[
    "project_name",
    "project_url",
    "external_url",
    "slave_portnum",
    "slaves",
    "builders",
    "schedulers",
    "change_sources",
    "status_targets",
    "properties",
    "merge_requests",
    "prioritize_builders",
    "event_horizon",
    "log_horizon",
    "build_horizon",
    "change_horizon",
    "build_cache_size",
    "change_cache_size",
    "log_compression_limit",
    "log_compression_method",
    "log_max_size",
    "log_max_tail_size",
    "db_url",
    "db_poll_interval",
    "multi_master",
    "debug_password",
    "remote_shell",
];

/// Keys that were accepted by older versions of this artifact format and are
/// now hard rejections, with the message telling the operator what to use
/// instead.
pub const DEPRECATED_KEYS: &[(&str, &str)] = &[
    (
        "sources",
        "'sources' is deprecated; use 'change_sources' instead",
    ),
    ("bots", "'bots' is deprecated; use 'slaves' instead"),
    ("interlocks", "'interlocks' is no longer accepted"),
];

/// A `slave_portnum` value as it may appear in the artifact: either a bare
/// port number (coerced to `tcp:<port>`) or an already-formed endpoint string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPortnum {
    /// A bare TCP port, e.g. `9989`.
    Port(u16),
    /// An already-formed endpoint spec, e.g. `"tcp:9989"`.
    Endpoint(String),
}

impl RawPortnum {
    /// Normalise to the `tcp:<port>` string form the worker listener expects.
    pub fn normalize(&self) -> String {
        match self {
            RawPortnum::Port(p) => format!("tcp:{p}"),
            RawPortnum::Endpoint(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSlave {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLockRef {
    pub name: String,
    pub id: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBuildStep {
    pub name: String,
    #[serde(default)]
    pub locks: Vec<RawLockRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBuildFactory {
    #[serde(default)]
    pub steps: Vec<RawBuildStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBuilder {
    pub name: String,
    pub builddir: Option<String>,
    pub slave_build_dir: Option<String>,
    #[serde(default)]
    pub slave_names: Vec<String>,
    pub category: Option<String>,
    pub event_horizon: Option<u32>,
    pub log_horizon: Option<u32>,
    pub build_horizon: Option<u32>,
    #[serde(default)]
    pub locks: Vec<RawLockRef>,
    #[serde(default)]
    pub factory: RawBuildFactory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawScheduler {
    pub name: String,
    #[serde(default)]
    pub builder_names: Vec<String>,
    #[serde(default = "default_scheduler_kind")]
    pub kind: String,
}

fn default_scheduler_kind() -> String {
    "unspecified".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawChangeSource {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStatusTarget {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "unspecified".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRemoteShell {
    pub endpoint: String,
}

/// Required top-level keys, in the order the spec's §4.4 lists them:
/// `schedulers`, `builders`, `slavePortnum`, `slaves`. `ConfigLoader` checks
/// for their presence itself (see [`crate::loader`]) and raises
/// [`coordinator_core::error::ConfigSchemaError::MissingKey`] before ever
/// attempting to deserialize `RawConfig`, so these fields stay plain
/// (non-`Option`, no `#[serde(default)]`) rather than silently defaulting to
/// empty.
pub const REQUIRED_KEYS: &[&str] = &["schedulers", "builders", "slave_portnum", "slaves"];

/// The as-parsed artifact. Everything but the four keys in [`REQUIRED_KEYS`]
/// is optional or defaulted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub project_name: Option<String>,
    pub project_url: Option<String>,
    pub external_url: Option<String>,
    pub slave_portnum: RawPortnum,
    pub slaves: Vec<RawSlave>,
    pub builders: Vec<RawBuilder>,
    pub schedulers: Vec<RawScheduler>,
    #[serde(default)]
    pub change_sources: Vec<RawChangeSource>,
    #[serde(default)]
    pub status_targets: Vec<RawStatusTarget>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    pub merge_requests: Option<String>,
    pub prioritize_builders: Option<String>,
    pub event_horizon: Option<u32>,
    pub log_horizon: Option<u32>,
    pub build_horizon: Option<u32>,
    pub change_horizon: Option<u32>,
    pub build_cache_size: Option<u32>,
    pub change_cache_size: Option<u32>,
    pub log_compression_limit: Option<serde_json::Value>,
    pub log_compression_method: Option<String>,
    pub log_max_size: Option<serde_json::Value>,
    pub log_max_tail_size: Option<serde_json::Value>,
    #[serde(default = "default_db_url")]
    pub db_url: String,
    pub db_poll_interval: Option<serde_json::Value>,
    #[serde(default)]
    pub multi_master: bool,
    pub debug_password: Option<String>,
    pub remote_shell: Option<RawRemoteShell>,
}

fn default_db_url() -> String {
    "sqlite:///state.sqlite".to_string()
}
