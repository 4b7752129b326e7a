//! Error handling in [`coordinator`][crate].
//!
//! `coordinator_core::Error` already carries every error a configuration
//! load or a reconfiguration can raise; this crate adds only the handful of
//! failure modes that belong to the process layer sitting on top of it —
//! installing a signal handler, and the CLI's own argument/report wrapping.

use thiserror::Error;

/// Errors raised by the coordinator service itself, as opposed to its
/// configuration or database layers (see [`coordinator_core::Error`] for those).
#[derive(Error, Debug)]
pub enum Error {
    /// Everything that can go wrong loading config or reconfiguring the live
    /// graph is already typed by `coordinator-core`/`coordinator-config`.
    #[error(transparent)]
    Core(#[from] coordinator_core::Error),

    /// Installing the reload-on-hangup signal handler failed. Only possible
    /// on platforms that expose `SIGHUP` in the first place.
    #[error("failed to install reload signal handler: {0}")]
    SignalInstall(#[source] std::io::Error),

    /// `getObjectId` on this coordinator's own identity failed before
    /// anything else could start.
    #[error("failed to resolve this coordinator's own object id: {0}")]
    IdentityResolution(#[source] coordinator_core::Error),
}
