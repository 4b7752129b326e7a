//! Entry point: read a configuration artifact off disk and turn it into a
//! validated [`ConfigModel`].

use crate::raw::{RawConfig, DEPRECATED_KEYS, KNOWN_KEYS, REQUIRED_KEYS};
use crate::validate::{self, Previous};
use coordinator_core::error::ConfigSchemaError;
use coordinator_core::{ConfigModel, Error};
use std::path::Path;

/// Loads and validates the configuration artifact.
///
/// Reconfiguration (triggered by a deferred SIGHUP in the embedder's event
/// loop) calls [`ConfigLoader::load`] again with `previous` set to the
/// currently-running model's write-once fields; a first boot passes `None`.
/// Either way, a load that returns `Err` leaves whatever the caller already
/// has running completely untouched — this function has no side effects
/// beyond reading the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read the artifact at `path`, parse it as TOML, and validate it.
    ///
    /// `previous` should be `Some(&running_model)` on every load after the
    /// first, so `db_url`/`db_poll_interval` drift is caught.
    pub fn load(path: &Path, previous: Option<&ConfigModel>) -> Result<ConfigModel, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::load_str(&text, previous)
    }

    /// Same as [`ConfigLoader::load`] but takes the artifact's contents
    /// directly; split out so tests (and a `--check-config` preflight) don't
    /// need a file on disk.
    pub fn load_str(text: &str, previous: Option<&ConfigModel>) -> Result<ConfigModel, Error> {
        let value: toml::Value = text
            .parse()
            .map_err(|e: toml::de::Error| Error::ConfigSyntax(e.to_string()))?;

        warn_on_unknown_keys(&value);
        reject_deprecated_keys(&value)?;
        require_keys(&value)?;

        let raw: RawConfig = value
            .try_into()
            .map_err(|e: toml::de::Error| Error::ConfigSyntax(e.to_string()))?;

        let prev = previous.map(|m| Previous {
            db_url: m.db_url.as_str(),
            db_poll_interval: m.db_poll_interval,
        });

        Ok(validate::validate(raw, prev)?)
    }

    /// Parse and validate without ever intending to run on the result —
    /// the basis for a `--check-config`-style preflight the embedder can
    /// expose on its CLI. Identical to `load` except the name documents intent.
    pub fn check(path: &Path) -> Result<ConfigModel, Error> {
        Self::load(path, None)
    }
}

fn warn_on_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else { return };
    for key in table.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "unrecognised configuration key; ignoring");
        }
    }
}

fn reject_deprecated_keys(value: &toml::Value) -> Result<(), Error> {
    let Some(table) = value.as_table() else { return Ok(()) };
    for (key, message) in DEPRECATED_KEYS {
        if table.contains_key(*key) {
            return Err(Error::ConfigSchema(ConfigSchemaError::DeprecatedKey((*message).to_string())));
        }
    }
    Ok(())
}

/// §4.4: "missing required keys (`schedulers`, `builders`, `slavePortnum`,
/// `slaves`) are errors". Checked against the raw table directly, before
/// `RawConfig` deserialization ever runs, so a missing key always surfaces
/// as `ConfigSchemaError::MissingKey` rather than a generic toml "missing
/// field" syntax error.
fn require_keys(value: &toml::Value) -> Result<(), Error> {
    let table = value.as_table().cloned().unwrap_or_default();
    for key in REQUIRED_KEYS {
        if !table.contains_key(*key) {
            return Err(Error::ConfigSchema(ConfigSchemaError::MissingKey((*key).to_string())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_artifact() {
        let text = r#"
            slave_portnum = 9989
            builders = []
            schedulers = []

            [[slaves]]
            name = "slave1"
        "#;
        let model = ConfigLoader::load_str(text, None).unwrap();
        assert_eq!(model.worker_listener, "tcp:9989");
    }

    #[test]
    fn rejects_deprecated_sources_key() {
        let text = r#"
            slave_portnum = 9989
            sources = []
        "#;
        let err = ConfigLoader::load_str(text, None).unwrap_err();
        assert!(matches!(err, Error::ConfigSchema(coordinator_core::error::ConfigSchemaError::DeprecatedKey(_))));
    }

    #[test]
    fn rejects_missing_required_key() {
        // Every required key but `slave_portnum` is present, so the single
        // reported `MissingKey` unambiguously names it.
        let text = r#"
            builders = []
            schedulers = []

            [[slaves]]
            name = "slave1"
        "#;
        let err = ConfigLoader::load_str(text, None).unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigSchema(coordinator_core::error::ConfigSchemaError::MissingKey(ref key)) if key == "slave_portnum"
        ));
    }

    #[test]
    fn rejects_each_missing_required_key_by_name() {
        // Each case supplies every required key except the one under test,
        // so `require_keys` (which walks `REQUIRED_KEYS` in order) can only
        // report the one we're checking for.
        for (text, missing) in [
            (
                r#"
                    builders = []
                    schedulers = []

                    [[slaves]]
                    name = "slave1"
                "#,
                "slave_portnum",
            ),
            (
                r#"
                    slave_portnum = 9989
                    builders = []
                    schedulers = []
                "#,
                "slaves",
            ),
            (
                r#"
                    slave_portnum = 9989
                    schedulers = []

                    [[slaves]]
                    name = "slave1"
                "#,
                "builders",
            ),
            (
                r#"
                    slave_portnum = 9989
                    builders = []

                    [[slaves]]
                    name = "slave1"
                "#,
                "schedulers",
            ),
        ] {
            let err = ConfigLoader::load_str(text, None).unwrap_err();
            assert!(
                matches!(
                    &err,
                    Error::ConfigSchema(coordinator_core::error::ConfigSchemaError::MissingKey(key)) if key == missing
                ),
                "expected MissingKey({missing}), got {err:?}"
            );
        }
    }
}
