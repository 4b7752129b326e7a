//! `coordinatord`: the coordinator process entry point.
//!
//! Parses the base directory and configuration path, initialises logging,
//! computes this run's [`MasterIdentity`], and either checks the
//! configuration artifact and exits (`--check-config`) or starts the
//! coordinator and runs it until shutdown.

use clap::Parser;
use coordinator::error::Error;
use coordinator::{stub_collaborators, Coordinator};
use coordinator_config::ConfigLoader;
use coordinator_core::MasterIdentity;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A buildmaster-style CI coordinator.
#[derive(Parser, Debug)]
#[command(name = "coordinatord", version, about)]
struct Cli {
    /// Base directory the coordinator is rooted at. Relative `db_url`s and
    /// the default configuration path are resolved against it.
    #[arg(long, default_value = ".")]
    basedir: PathBuf,

    /// Path to the configuration artifact. Relative to the current
    /// directory, not `basedir`, matching how a shell would resolve it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse and validate the configuration, then exit without starting
    /// the coordinator.
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| self.basedir.join("master.cfg"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config_path();

    if cli.check_config {
        match ConfigLoader::check(&config_path) {
            Ok(model) => {
                tracing::info!(path = %config_path.display(), builders = model.builders.len(), "configuration is valid");
                return Ok(());
            }
            Err(error) => {
                tracing::error!(path = %config_path.display(), %error, "configuration is invalid");
                std::process::exit(1);
            }
        }
    }

    let identity = master_identity(&cli.basedir)?;
    tracing::info!(master = %identity.master_name(), incarnation = %identity.incarnation(), "starting coordinator");

    let collaborators = stub_collaborators::default_collaborators(&cli.basedir);
    let coordinator = Arc::new(Coordinator::new(identity, config_path, collaborators));
    coordinator.start().await?;

    #[cfg(unix)]
    let _reload_handle = coordinator.clone().spawn_reload_on_hangup()?;

    shutdown_signal().await;
    tracing::info!("shutdown signal received, exiting");
    Ok(())
}

/// This run's identity: hostname and basedir for the human-facing half, pid
/// and current wall-clock time for the incarnation half. Resolved once, here,
/// so every other component treats it as fixed for the life of the process.
///
/// `basedir` is canonicalized first: the spec's `MasterIdentity` is defined
/// as `(hostname, absolute-basedir)`, and the CLI's `--basedir` defaults to
/// `.`, so without this the same coordinator would get a different,
/// relative "identity" depending on the working directory it happened to be
/// launched from.
fn master_identity(basedir: &std::path::Path) -> Result<MasterIdentity, Error> {
    let hostname = hostname::get()
        .map_err(|e| Error::IdentityResolution(coordinator_core::Error::Io(e)))?
        .to_string_lossy()
        .into_owned();
    let absolute_basedir = std::fs::canonicalize(basedir)
        .map_err(|e| Error::IdentityResolution(coordinator_core::Error::Io(e)))?;
    let boot_time_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(MasterIdentity::new(hostname, absolute_basedir, std::process::id(), boot_time_secs))
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(error) => {
            tracing::warn!(%error, "failed to install SIGTERM handler; waiting on ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
