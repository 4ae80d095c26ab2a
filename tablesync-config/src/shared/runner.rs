use serde::Deserialize;

use crate::Config;
use crate::shared::{LogConfig, PgConnectionConfig, SpecStoreConfig, SyncConfig, ValidationError};

/// Top-level configuration of the `tablesync` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Database holding the staging tables, the production tables and the spec table.
    pub target: PgConnectionConfig,
    #[serde(default)]
    pub specs: SpecStoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl RunnerConfig {
    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.target.tls.validate()?;
        self.specs.validate()?;
        self.sync.validate()?;

        Ok(())
    }
}

impl Config for RunnerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_configuration_uses_defaults() {
        let config: RunnerConfig = serde_json::from_str(
            r#"{"target":{"host":"localhost","port":5432,"name":"ods","username":"sync"}}"#,
        )
        .unwrap();

        assert_eq!(config.specs.table, "merge_config");
        assert_eq!(config.sync.max_parallel_tables, 1);
        assert!(config.log.directory.is_none());
        assert!(config.validate().is_ok());
    }
}
