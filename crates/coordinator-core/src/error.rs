//! Error taxonomy for the coordinator (see the error handling design).

use thiserror::Error;

/// Errors that can surface from configuration validation.
///
/// Every variant here corresponds to a named failure mode the loader
/// guarantees: on any of these, the caller leaves the previous [`crate::ConfigModel`]
/// (and the live component graph built from it) completely untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// A required top-level key was missing from the artifact.
    #[error("config dictionary is missing required key '{0}'")]
    MissingKey(String),
    /// A deprecated key was present; the message matches what the operator should do instead.
    #[error("{0}")]
    DeprecatedKey(String),
    /// A value had the wrong shape (e.g. `logCompressionLimit` not an integer).
    #[error("{field} has the wrong type: {detail}")]
    WrongType {
        /// Offending field name.
        field: String,
        /// Human-readable explanation.
        detail: String,
    },
    /// A value was outside its allowed enumeration (e.g. `logCompressionMethod`).
    #[error("{field} must be one of {allowed:?}, got '{got}'")]
    InvalidEnum {
        /// Offending field name.
        field: String,
        /// The values that would have been accepted.
        allowed: Vec<String>,
        /// The value that was actually supplied.
        got: String,
    },
    /// A slave, builder, scheduler, change source or status target name was reused.
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName {
        /// Which collection the duplicate was found in.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
    /// A slave name collided with a reserved name (`debug`, `change`, `status`).
    #[error("reserved name '{0}' used for a slave")]
    ReservedSlaveName(String),
    /// A builder name started with an underscore.
    #[error("builder names must not start with an underscore: {0}")]
    ReservedBuilderName(String),
    /// A builder referenced a slave name that was never declared.
    #[error("builder '{builder}' uses undefined slave '{slave}'")]
    UnknownSlave {
        /// The builder doing the referencing.
        builder: String,
        /// The slave name that does not exist.
        slave: String,
    },
    /// A scheduler referenced a builder name that was never declared.
    #[error("scheduler '{scheduler}' uses unknown builder '{builder}'")]
    UnknownBuilder {
        /// The scheduler doing the referencing.
        scheduler: String,
        /// The builder name that does not exist.
        builder: String,
    },
    /// Two builders reused the same build directory.
    #[error("builder '{builder}' reuses builddir '{build_dir}'")]
    DuplicateBuildDir {
        /// The builder that collided.
        builder: String,
        /// The build directory both builders claimed.
        build_dir: String,
    },
    /// The same lock name resolved to two different lock identities.
    #[error("two different locks share the name '{name}'")]
    ConflictingLockIdentity {
        /// The shared (and now ambiguous) lock name.
        name: String,
    },
    /// `db_url` or `db_poll_interval` changed after the first successful load.
    #[error("cannot change '{field}' after the master has started")]
    ImmutableFieldChanged {
        /// Either `db_url` or `db_poll_interval`.
        field: &'static str,
    },
}

/// Errors bubbled up from the coordinator's runtime and reconfiguration paths.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration artifact failed to parse/evaluate at all.
    #[error("failed to parse configuration artifact: {0}")]
    ConfigSyntax(String),
    /// The configuration artifact parsed but violated a schema invariant.
    #[error("invalid configuration: {0}")]
    ConfigSchema(#[from] ConfigSchemaError),
    /// The database exists but is at a prior schema version.
    #[error("database not ready; run the schema upgrade: {0}")]
    DatabaseNotReady(String),
    /// A database operation failed transiently; the caller may retry from the same mark.
    #[error("transient database error: {0}")]
    TransientDb(String),
    /// An observer raised while handling a bus delivery. Logged and swallowed by the bus;
    /// surfaced here only for tests and for components that want to inspect it.
    #[error("observer failed: {0}")]
    Observer(String),
    /// I/O failure reading the configuration artifact from disk.
    #[error("failed to read configuration artifact: {0}")]
    Io(#[from] std::io::Error),
}
