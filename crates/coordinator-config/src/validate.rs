//! Turns a [`RawConfig`] into a validated [`ConfigModel`], enforcing every
//! invariant the configuration artifact must satisfy.
//!
//! This is a straight line call graph (no recursion, no visitor) because the
//! checks are mostly independent of one another; where one check's output
//! feeds another (e.g. lock identity must be resolved before builders can be
//! built), it's sequenced by ordinary function calls.

use crate::raw::{RawBuilder, RawConfig, RawLockRef};
use coordinator_core::error::ConfigSchemaError;
use coordinator_core::model::{
    BuildFactorySpec, BuildStepSpec, BuilderSpec, ChangeSourceSpec, ConfigModel, GlobalCaps,
    LogCompressionMethod, MergeRequestsPolicy, PrioritizeBuildersPolicy, ProjectIdentity,
    RemoteShellSpec, SchedulerSpec, SlaveSpec, StatusTargetSpec, RESERVED_SLAVE_NAMES,
};
use coordinator_core::{LockId, util::safe_translate};
use std::collections::{BTreeMap, BTreeSet};

/// The previously-loaded model's write-once fields, carried across a
/// reconfiguration so `db_url`/`db_poll_interval` drift can be rejected. `None`
/// on the very first load.
#[derive(Debug, Clone, Copy)]
pub struct Previous<'a> {
    /// The prior `db_url`.
    pub db_url: &'a str,
    /// The prior `db_poll_interval`.
    pub db_poll_interval: Option<u64>,
}

/// Validate `raw` into a [`ConfigModel`]. `previous` is `Some` on every load
/// after the first, and is what lets us reject a changed `db_url`/
/// `db_poll_interval` the way the original distinguishes first-boot from
/// reconfiguration.
pub fn validate(raw: RawConfig, previous: Option<Previous<'_>>) -> Result<ConfigModel, ConfigSchemaError> {
    let caps = build_caps(&raw)?;
    let locks = collect_lock_identities(&raw)?;

    validate_slave_names(&raw)?;
    validate_builders_preconditions(&raw)?;

    let slaves: Vec<SlaveSpec> = raw.slaves.iter().map(|s| SlaveSpec { name: s.name.clone() }).collect();
    let builders = build_builders(&raw, &caps, &locks)?;
    let schedulers = build_schedulers(&raw)?;

    let slave_names: BTreeSet<&str> = slaves.iter().map(|s| s.name.as_str()).collect();
    for builder in &builders {
        for slave in &builder.slave_names {
            if !slave_names.contains(slave.as_str()) {
                return Err(ConfigSchemaError::UnknownSlave {
                    builder: builder.name.clone(),
                    slave: slave.clone(),
                });
            }
        }
    }

    if !raw.multi_master {
        let builder_names: BTreeSet<&str> = builders.iter().map(|b| b.name.as_str()).collect();
        for scheduler in &schedulers {
            for b in &scheduler.builder_names {
                if !builder_names.contains(b.as_str()) {
                    return Err(ConfigSchemaError::UnknownBuilder {
                        scheduler: scheduler.name.clone(),
                        builder: b.clone(),
                    });
                }
            }
        }
    }

    let change_sources = build_change_sources(&raw)?;
    let status_targets = build_status_targets(&raw)?;

    let db_url = raw.db_url.clone();
    let db_poll_interval = match &raw.db_poll_interval {
        None => None,
        Some(v) => Some(as_u64(v, "db_poll_interval")?),
    };

    if let Some(prev) = previous {
        if prev.db_url != db_url {
            return Err(ConfigSchemaError::ImmutableFieldChanged { field: "db_url" });
        }
        if prev.db_poll_interval != db_poll_interval {
            return Err(ConfigSchemaError::ImmutableFieldChanged {
                field: "db_poll_interval",
            });
        }
    }

    let merge_requests = match &raw.merge_requests {
        None => None,
        Some(s) if s == "default" => Some(MergeRequestsPolicy::Default),
        Some(s) if s == "disabled" => Some(MergeRequestsPolicy::Disabled),
        Some(s) => Some(MergeRequestsPolicy::Named(s.clone())),
    };
    let prioritize_builders = match &raw.prioritize_builders {
        None => None,
        Some(s) if s == "default" => Some(PrioritizeBuildersPolicy::Default),
        Some(s) => Some(PrioritizeBuildersPolicy::Named(s.clone())),
    };

    Ok(ConfigModel {
        project: ProjectIdentity {
            name: raw.project_name.clone(),
            url: raw.project_url.clone(),
            external_url: raw.external_url.clone(),
        },
        worker_listener: raw.slave_portnum.normalize(),
        slaves,
        builders,
        schedulers,
        change_sources,
        status_targets,
        properties: raw.properties.clone(),
        caps,
        merge_requests,
        prioritize_builders,
        db_url,
        db_poll_interval,
        multi_master: raw.multi_master,
        debug_password: raw.debug_password.clone(),
        remote_shell: raw.remote_shell.as_ref().map(|r| RemoteShellSpec {
            endpoint: r.endpoint.clone(),
        }),
    })
}

fn build_caps(raw: &RawConfig) -> Result<GlobalCaps, ConfigSchemaError> {
    let mut caps = GlobalCaps::default();
    if let Some(v) = raw.event_horizon {
        caps.event_horizon = v;
    }
    caps.log_horizon = raw.log_horizon;
    caps.build_horizon = raw.build_horizon;
    caps.change_horizon = raw.change_horizon;
    caps.build_cache_size = raw.build_cache_size;
    if raw.change_cache_size.is_some() {
        // The original never actually implements this cap; rather than
        // silently no-op it we reject so a config author notices.
        return Err(ConfigSchemaError::WrongType {
            field: "change_cache_size".into(),
            detail: "not yet supported by this coordinator".into(),
        });
    }
    if let Some(v) = &raw.log_compression_limit {
        caps.log_compression_limit = as_u32(v, "log_compression_limit")?;
    }
    if let Some(s) = &raw.log_compression_method {
        caps.log_compression_method = match s.as_str() {
            "bz2" => LogCompressionMethod::Bz2,
            "gz" => LogCompressionMethod::Gz,
            other => {
                return Err(ConfigSchemaError::InvalidEnum {
                    field: "log_compression_method".into(),
                    allowed: vec!["bz2".into(), "gz".into()],
                    got: other.into(),
                })
            }
        };
    }
    if let Some(v) = &raw.log_max_size {
        caps.log_max_size = Some(as_u32(v, "log_max_size")?);
    }
    if let Some(v) = &raw.log_max_tail_size {
        caps.log_max_tail_size = Some(as_u32(v, "log_max_tail_size")?);
    }
    Ok(caps)
}

fn as_u32(value: &serde_json::Value, field: &str) -> Result<u32, ConfigSchemaError> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| ConfigSchemaError::WrongType {
            field: field.to_string(),
            detail: format!("expected a non-negative integer, got {value}"),
        })
}

fn as_u64(value: &serde_json::Value, field: &str) -> Result<u64, ConfigSchemaError> {
    value.as_u64().ok_or_else(|| ConfigSchemaError::WrongType {
        field: field.to_string(),
        detail: format!("expected a non-negative integer, got {value}"),
    })
}

fn validate_slave_names(raw: &RawConfig) -> Result<(), ConfigSchemaError> {
    let mut seen = BTreeSet::new();
    for slave in &raw.slaves {
        if RESERVED_SLAVE_NAMES.contains(&slave.name.as_str()) {
            return Err(ConfigSchemaError::ReservedSlaveName(slave.name.clone()));
        }
        if !seen.insert(slave.name.as_str()) {
            return Err(ConfigSchemaError::DuplicateName {
                kind: "slave",
                name: slave.name.clone(),
            });
        }
    }
    Ok(())
}

fn validate_builders_preconditions(raw: &RawConfig) -> Result<(), ConfigSchemaError> {
    let mut seen = BTreeSet::new();
    for builder in &raw.builders {
        if builder.name.starts_with('_') {
            return Err(ConfigSchemaError::ReservedBuilderName(builder.name.clone()));
        }
        if !seen.insert(builder.name.as_str()) {
            return Err(ConfigSchemaError::DuplicateName {
                kind: "builder",
                name: builder.name.clone(),
            });
        }
    }
    Ok(())
}

/// Collect every lock name -> id mapping across the whole artifact (builders
/// and every step of every builder's factory), rejecting a name that
/// resolves to two different ids.
fn collect_lock_identities(raw: &RawConfig) -> Result<BTreeMap<String, LockId>, ConfigSchemaError> {
    let mut locks: BTreeMap<String, LockId> = BTreeMap::new();
    let mut note = |r: &RawLockRef, locks: &mut BTreeMap<String, LockId>| -> Result<(), ConfigSchemaError> {
        let id = LockId(r.id);
        match locks.get(&r.name) {
            Some(existing) if *existing != id => {
                Err(ConfigSchemaError::ConflictingLockIdentity { name: r.name.clone() })
            }
            _ => {
                locks.insert(r.name.clone(), id);
                Ok(())
            }
        }
    };
    for builder in &raw.builders {
        for lock in &builder.locks {
            note(lock, &mut locks)?;
        }
        for step in &builder.factory.steps {
            for lock in &step.locks {
                note(lock, &mut locks)?;
            }
        }
    }
    Ok(locks)
}

fn resolve_locks(
    raws: &[RawLockRef],
    locks: &BTreeMap<String, LockId>,
) -> Vec<coordinator_core::model::LockRef> {
    raws.iter()
        .map(|r| coordinator_core::model::LockRef {
            name: r.name.clone(),
            id: *locks.get(&r.name).expect("collected during identity pass"),
        })
        .collect()
}

fn build_builders(
    raw: &RawConfig,
    caps: &GlobalCaps,
    locks: &BTreeMap<String, LockId>,
) -> Result<Vec<BuilderSpec>, ConfigSchemaError> {
    let mut out = Vec::with_capacity(raw.builders.len());
    let mut build_dirs: BTreeSet<String> = BTreeSet::new();
    for b in &raw.builders {
        let spec = build_one_builder(b, caps, locks)?;
        if !build_dirs.insert(spec.build_dir.clone()) {
            return Err(ConfigSchemaError::DuplicateBuildDir {
                builder: spec.name.clone(),
                build_dir: spec.build_dir.clone(),
            });
        }
        out.push(spec);
    }
    Ok(out)
}

fn build_one_builder(
    b: &RawBuilder,
    caps: &GlobalCaps,
    locks: &BTreeMap<String, LockId>,
) -> Result<BuilderSpec, ConfigSchemaError> {
    let build_dir = b.builddir.clone().unwrap_or_else(|| safe_translate(&b.name));
    let slave_build_dir = b.slave_build_dir.clone().unwrap_or_else(|| build_dir.clone());
    let steps = b
        .factory
        .steps
        .iter()
        .map(|s| BuildStepSpec {
            name: s.name.clone(),
            locks: resolve_locks(&s.locks, locks),
        })
        .collect();
    Ok(BuilderSpec {
        name: b.name.clone(),
        build_dir,
        slave_build_dir,
        slave_names: b.slave_names.clone(),
        category: b.category.clone(),
        event_horizon: b.event_horizon.unwrap_or(caps.event_horizon),
        log_horizon: b.log_horizon.or(caps.log_horizon),
        build_horizon: b.build_horizon.or(caps.build_horizon),
        locks: resolve_locks(&b.locks, locks),
        factory: BuildFactorySpec { steps },
    })
}

fn build_schedulers(raw: &RawConfig) -> Result<Vec<SchedulerSpec>, ConfigSchemaError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(raw.schedulers.len());
    for s in &raw.schedulers {
        if !seen.insert(s.name.as_str()) {
            return Err(ConfigSchemaError::DuplicateName {
                kind: "scheduler",
                name: s.name.clone(),
            });
        }
        out.push(SchedulerSpec {
            name: s.name.clone(),
            builder_names: s.builder_names.clone(),
            kind: s.kind.clone(),
        });
    }
    Ok(out)
}

fn build_change_sources(raw: &RawConfig) -> Result<Vec<ChangeSourceSpec>, ConfigSchemaError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(raw.change_sources.len());
    for c in &raw.change_sources {
        if !seen.insert(c.name.as_str()) {
            return Err(ConfigSchemaError::DuplicateName {
                kind: "change source",
                name: c.name.clone(),
            });
        }
        out.push(ChangeSourceSpec {
            name: c.name.clone(),
            kind: c.kind.clone(),
        });
    }
    Ok(out)
}

fn build_status_targets(raw: &RawConfig) -> Result<Vec<StatusTargetSpec>, ConfigSchemaError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(raw.status_targets.len());
    for s in &raw.status_targets {
        if !seen.insert(s.name.as_str()) {
            return Err(ConfigSchemaError::DuplicateName {
                kind: "status target",
                name: s.name.clone(),
            });
        }
        out.push(StatusTargetSpec {
            name: s.name.clone(),
            kind: s.kind.clone(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawPortnum, RawSlave};

    fn minimal() -> RawConfig {
        RawConfig {
            project_name: None,
            project_url: None,
            external_url: None,
            slave_portnum: RawPortnum::Port(9989),
            slaves: vec![RawSlave { name: "slave1".into() }],
            builders: vec![],
            schedulers: vec![],
            change_sources: vec![],
            status_targets: vec![],
            properties: BTreeMap::new(),
            merge_requests: None,
            prioritize_builders: None,
            event_horizon: None,
            log_horizon: None,
            build_horizon: None,
            change_horizon: None,
            build_cache_size: None,
            change_cache_size: None,
            log_compression_limit: None,
            log_compression_method: None,
            log_max_size: None,
            log_max_tail_size: None,
            db_url: "sqlite:///state.sqlite".into(),
            db_poll_interval: None,
            multi_master: false,
            debug_password: None,
            remote_shell: None,
        }
    }

    #[test]
    fn minimal_config_validates() {
        let model = validate(minimal(), None).unwrap();
        assert_eq!(model.worker_listener, "tcp:9989");
        assert_eq!(model.slaves.len(), 1);
    }

    #[test]
    fn reserved_slave_name_rejected() {
        let mut raw = minimal();
        raw.slaves.push(RawSlave { name: "debug".into() });
        let err = validate(raw, None).unwrap_err();
        assert_eq!(err, ConfigSchemaError::ReservedSlaveName("debug".into()));
    }

    #[test]
    fn duplicate_build_dir_rejected() {
        let mut raw = minimal();
        raw.builders.push(RawBuilder {
            name: "b1".into(),
            builddir: Some("shared".into()),
            slave_build_dir: None,
            slave_names: vec!["slave1".into()],
            category: None,
            event_horizon: None,
            log_horizon: None,
            build_horizon: None,
            locks: vec![],
            factory: Default::default(),
        });
        raw.builders.push(RawBuilder {
            name: "b2".into(),
            builddir: Some("shared".into()),
            slave_build_dir: None,
            slave_names: vec!["slave1".into()],
            category: None,
            event_horizon: None,
            log_horizon: None,
            build_horizon: None,
            locks: vec![],
            factory: Default::default(),
        });
        let err = validate(raw, None).unwrap_err();
        assert!(matches!(err, ConfigSchemaError::DuplicateBuildDir { .. }));
    }

    #[test]
    fn conflicting_lock_identity_rejected() {
        let mut raw = minimal();
        raw.builders.push(RawBuilder {
            name: "b1".into(),
            builddir: None,
            slave_build_dir: None,
            slave_names: vec!["slave1".into()],
            category: None,
            event_horizon: None,
            log_horizon: None,
            build_horizon: None,
            locks: vec![RawLockRef { name: "l".into(), id: 1 }],
            factory: Default::default(),
        });
        raw.builders.push(RawBuilder {
            name: "b2".into(),
            builddir: None,
            slave_build_dir: None,
            slave_names: vec!["slave1".into()],
            category: None,
            event_horizon: None,
            log_horizon: None,
            build_horizon: None,
            locks: vec![RawLockRef { name: "l".into(), id: 2 }],
            factory: Default::default(),
        });
        let err = validate(raw, None).unwrap_err();
        assert_eq!(err, ConfigSchemaError::ConflictingLockIdentity { name: "l".into() });
    }

    #[test]
    fn db_url_immutable_across_reload() {
        let raw = minimal();
        let prev = Previous {
            db_url: "sqlite:///other.sqlite",
            db_poll_interval: None,
        };
        let err = validate(raw, Some(prev)).unwrap_err();
        assert_eq!(err, ConfigSchemaError::ImmutableFieldChanged { field: "db_url" });
    }

    #[test]
    fn unknown_slave_reference_rejected() {
        let mut raw = minimal();
        raw.builders.push(RawBuilder {
            name: "b1".into(),
            builddir: None,
            slave_build_dir: None,
            slave_names: vec!["ghost".into()],
            category: None,
            event_horizon: None,
            log_horizon: None,
            build_horizon: None,
            locks: vec![],
            factory: Default::default(),
        });
        let err = validate(raw, None).unwrap_err();
        assert!(matches!(err, ConfigSchemaError::UnknownSlave { .. }));
    }
}
