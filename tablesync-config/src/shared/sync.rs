use serde::Deserialize;

use crate::shared::ValidationError;

/// Default name of the table holding the sync specifications.
const DEFAULT_SPEC_TABLE: &str = "merge_config";

/// How a reconciliation plan is turned into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Separate update, insert and delete statements inside one transaction.
    ///
    /// Works on every supported Postgres version and reports per-kind row counts.
    #[default]
    Statements,
    /// A single `merge` statement. Requires Postgres 17 for `when not matched by source`.
    Native,
}

/// Behavior of a single sync run.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Number of table-pairs reconciled concurrently. `1` processes them one at a time.
    #[serde(default = "SyncConfig::default_max_parallel_tables")]
    pub max_parallel_tables: u16,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Applied with `set local statement_timeout` inside each table-pair transaction.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
}

impl SyncConfig {
    fn default_max_parallel_tables() -> u16 {
        1
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_parallel_tables == 0 {
            return Err(ValidationError::MaxParallelTablesZero);
        }

        if self.statement_timeout_ms == Some(0) {
            return Err(ValidationError::StatementTimeoutZero);
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel_tables: Self::default_max_parallel_tables(),
            merge_strategy: MergeStrategy::default(),
            statement_timeout_ms: None,
        }
    }
}

/// Where the sync specifications are read from.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecStoreConfig {
    /// Qualified name of the configuration table, `merge_config` by default.
    #[serde(default = "SpecStoreConfig::default_table")]
    pub table: String,
    /// Column giving the processing order. Rows are ordered by `target_table` when unset.
    #[serde(default)]
    pub order_by_column: Option<String>,
}

impl SpecStoreConfig {
    fn default_table() -> String {
        DEFAULT_SPEC_TABLE.to_string()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.trim().is_empty() {
            return Err(ValidationError::EmptySpecTable);
        }

        Ok(())
    }
}

impl Default for SpecStoreConfig {
    fn default() -> Self {
        Self {
            table: Self::default_table(),
            order_by_column: None,
        }
    }
}
