//! Master identity and incarnation.

use std::path::{Path, PathBuf};

/// Identifies one coordinator process for humans (`hostname` + `basedir`) and
/// distinguishes successive runs of it from each other (`pid` + `boot_time`).
///
/// Both halves are computed once, at construction, and never change for the
/// lifetime of the process — see the process layout in the external interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterIdentity {
    hostname: String,
    basedir: PathBuf,
    pid: u32,
    boot_time_secs: u64,
}

impl MasterIdentity {
    /// Build an identity for a coordinator rooted at `basedir`, using the
    /// current process id and the given boot timestamp (epoch seconds).
    ///
    /// `boot_time_secs` is taken as a parameter rather than read from the
    /// clock here so that callers (and tests) control how "now" is defined.
    pub fn new(hostname: impl Into<String>, basedir: impl AsRef<Path>, pid: u32, boot_time_secs: u64) -> Self {
        Self {
            hostname: hostname.into(),
            basedir: basedir.as_ref().to_path_buf(),
            pid,
            boot_time_secs,
        }
    }

    /// Human-facing identifier: `hostname:/absolute/basedir`.
    pub fn master_name(&self) -> String {
        format!("{}:{}", self.hostname, self.basedir.display())
    }

    /// Incarnation token distinguishing this run from any other run of the
    /// same master: `pid<PID>-boot<epoch-seconds>`.
    pub fn incarnation(&self) -> String {
        format!("pid{}-boot{}", self.pid, self.boot_time_secs)
    }

    /// The base directory this coordinator was started with.
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// The hostname component, as reported by the OS at startup.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The process id captured at startup.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The boot timestamp (epoch seconds) captured at startup.
    pub fn boot_time_secs(&self) -> u64 {
        self.boot_time_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_name_combines_host_and_basedir() {
        let id = MasterIdentity::new("build01", "/srv/master", 4242, 1_700_000_000);
        assert_eq!(id.master_name(), "build01:/srv/master");
    }

    #[test]
    fn incarnation_combines_pid_and_boot_time() {
        let id = MasterIdentity::new("build01", "/srv/master", 4242, 1_700_000_000);
        assert_eq!(id.incarnation(), "pid4242-boot1700000000");
    }
}
