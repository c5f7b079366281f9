//! Coordinator configuration
//!
//! Settings are read from an optional YAML file named by
//! `CONTROLLER_PAUSE_CONFIG`, then individual environment variables override
//! the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::snapshot::{DEFAULT_SNAPSHOT_NAME, DEFAULT_SNAPSHOT_NAMESPACE};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CONTROLLER_PAUSE_CONFIG";

const ENV_PREFIX: &str = "CONTROLLER_PAUSE_";

/// Upper bound on conflict retries per update
pub const MAX_CONFLICT_RETRIES: u32 = 10;

/// Coordinator configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Name of the replica snapshot ConfigMap
    pub snapshot_name: String,

    /// Namespace of the replica snapshot ConfigMap
    pub snapshot_namespace: String,

    /// Workloads processed concurrently (1 = sequential)
    pub concurrency: usize,

    /// Fresh-fetch retries after an update conflict (0 = give up immediately)
    pub conflict_retries: u32,

    /// Delete the snapshot record once every workload resumed
    pub clear_snapshot_after_resume: bool,

    /// Port for the metrics/health server, disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_name: DEFAULT_SNAPSHOT_NAME.to_string(),
            snapshot_namespace: DEFAULT_SNAPSHOT_NAMESPACE.to_string(),
            concurrency: 1,
            conflict_retries: 0,
            clear_snapshot_after_resume: false,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load from the config file (if any) and the process environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {}", path.display(), e)))?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Apply overrides from a key lookup; keys are env var names without the
    /// `CONTROLLER_PAUSE_` prefix.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("SNAPSHOT_NAME") {
            self.snapshot_name = v;
        }
        if let Some(v) = lookup("SNAPSHOT_NAMESPACE") {
            self.snapshot_namespace = v;
        }
        if let Some(v) = lookup("CONCURRENCY") {
            self.concurrency = parse_env("CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("CONFLICT_RETRIES") {
            self.conflict_retries = parse_env("CONFLICT_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CLEAR_SNAPSHOT_AFTER_RESUME") {
            self.clear_snapshot_after_resume = parse_env("CLEAR_SNAPSHOT_AFTER_RESUME", &v)?;
        }
        if let Some(v) = lookup("METRICS_PORT") {
            self.metrics_port = Some(parse_env("METRICS_PORT", &v)?);
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_name.trim().is_empty() {
            return Err(Error::config("snapshotName must not be empty"));
        }
        if self.snapshot_namespace.trim().is_empty() {
            return Err(Error::config("snapshotNamespace must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        if self.conflict_retries > MAX_CONFLICT_RETRIES {
            return Err(Error::config(format!(
                "conflictRetries {} exceeds maximum of {}",
                self.conflict_retries, MAX_CONFLICT_RETRIES
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::config(format!("invalid {}{} '{}': {}", ENV_PREFIX, key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_snapshot_location() {
        let config = Config::default();
        assert_eq!(config.snapshot_name, "controller-replicas");
        assert_eq!(config.snapshot_namespace, "cattle-resources-system");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.conflict_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_are_overridden_by_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "snapshotNamespace: backup-system\nconcurrency: 4").unwrap();

        let mut config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.snapshot_namespace, "backup-system");
        assert_eq!(config.snapshot_name, "controller-replicas");

        let env = HashMap::from([
            ("CONCURRENCY", "2"),
            ("CONFLICT_RETRIES", "3"),
            ("METRICS_PORT", "9090"),
        ]);
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.conflict_retries, 3);
        assert_eq!(config.metrics_port, Some(9090));
    }

    #[test]
    fn bad_env_value_is_a_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == "CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CONTROLLER_PAUSE_CONCURRENCY"));
    }

    #[test]
    fn validation_rejects_zero_concurrency_and_excess_retries() {
        let config = Config {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            conflict_retries: MAX_CONFLICT_RETRIES + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
