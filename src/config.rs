//! Store configuration
//!
//! Loaded once at startup from a JSON file. Every section except `tenants`
//! has defaults; `validate` runs before any partition is opened.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fanout::FanoutConfig;
use crate::fields::SchemaConfig;
use crate::observability::{log_event, Event, Logger, Severity};
use crate::tenant::TenantConfig;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub tenants: TenantConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    /// Minimum log severity, case-insensitive (default: "INFO")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    Severity::Info.as_str().to_string()
}

impl StoreConfig {
    /// Default configuration over the given tenant keys
    pub fn with_tenants(keys: impl IntoIterator<Item = u16>) -> Self {
        Self {
            tenants: TenantConfig::with_keys(keys),
            fanout: FanoutConfig::default(),
            schema: SchemaConfig::default(),
            log_level: default_log_level(),
        }
    }

    /// Reads and validates a JSON config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&raw)?;

        let tenants = config.tenants.keys.len().to_string();
        log_event(
            Event::ConfigLoaded,
            &[("path", &path.display().to_string()), ("tenants", &tenants)],
        );
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let keys = &self.tenants.keys;
        if keys.is_empty() {
            return Err(ConfigError::Invalid("tenant set is empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        for key in keys {
            if key.get() == 0 {
                return Err(ConfigError::Invalid("tenant key 0 is reserved".to_string()));
            }
            if !seen.insert(*key) {
                return Err(ConfigError::Invalid(format!("duplicate tenant key {}", key)));
            }
        }
        if self.tenants.partition_prefix.is_empty() {
            return Err(ConfigError::Invalid("partition prefix is empty".to_string()));
        }
        if self.tenants.alias_fields.is_empty() {
            return Err(ConfigError::Invalid("no alias fields configured".to_string()));
        }
        if self.schema.batch_size == 0 {
            return Err(ConfigError::Invalid("schema.batch_size must be positive".to_string()));
        }
        if self.fanout.per_partition_sample == 0 {
            return Err(ConfigError::Invalid(
                "fanout.per_partition_sample must be positive".to_string(),
            ));
        }
        self.severity()?;
        Ok(())
    }

    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    /// Installs `log_level` as the process-wide minimum severity
    pub fn apply_log_level(&self) -> ConfigResult<()> {
        Logger::set_min_severity(self.severity()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::tenant::TenantKey;

    #[test]
    fn test_load_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"tenants": {{"keys": [1, 2, 3]}}}}"#).unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert_eq!(
            config.tenants.keys,
            vec![TenantKey::new(1), TenantKey::new(2), TenantKey::new(3)]
        );
        assert_eq!(config.tenants.partition_prefix, "members_ac_");
        assert_eq!(config.fanout, FanoutConfig::default());
        assert_eq!(config.schema.batch_size, 500);
        assert_eq!(config.severity().unwrap(), Severity::Info);
    }

    #[test]
    fn test_load_overrides() {
        let raw = r#"{
            "tenants": {"keys": [7], "partition_prefix": "voters_", "alias_fields": ["ac_name"]},
            "fanout": {"max_workers": 8},
            "schema": {"batch_size": 100},
            "log_level": "warn"
        }"#;
        let config = StoreConfig::from_json_str(raw).unwrap();
        assert_eq!(config.tenants.partition_name(TenantKey::new(7)), "voters_7");
        assert_eq!(config.fanout.max_workers, 8);
        assert_eq!(config.fanout.per_partition_sample, 500);
        assert_eq!(config.schema.batch_size, 100);
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_rejects_invalid() {
        let cases = [
            r#"{"tenants": {"keys": []}}"#,
            r#"{"tenants": {"keys": [1, 1]}}"#,
            r#"{"tenants": {"keys": [0]}}"#,
            r#"{"tenants": {"keys": [1]}, "schema": {"batch_size": 0}}"#,
            r#"{"tenants": {"keys": [1]}, "fanout": {"per_partition_sample": 0}}"#,
            r#"{"tenants": {"keys": [1]}, "log_level": "loud"}"#,
        ];
        for raw in cases {
            assert!(
                matches!(StoreConfig::from_json_str(raw), Err(ConfigError::Invalid(_))),
                "accepted {}",
                raw
            );
        }
        assert!(matches!(
            StoreConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
