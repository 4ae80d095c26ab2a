use sqlx::PgPool;
use tablesync_config::shared::SpecStoreConfig;
use tablesync_postgres::types::{Identifier, TableName};
use tracing::{debug, info};

use crate::error::{ErrorKind, SyncResult};
use crate::spec::{SpecRow, SyncSpec, parse_spec_rows};
use crate::store::spec::SpecStore;
use crate::sync_error;

/// Column ordering the rows when no ordering column is configured.
const DEFAULT_ORDER_BY_COLUMN: &str = "target_table";

/// [`SpecStore`] reading the configuration table from Postgres.
///
/// Runs a single query per call, so every load sees a consistent snapshot of the table.
#[derive(Debug, Clone)]
pub struct PostgresSpecStore {
    pool: PgPool,
    table: TableName,
    order_by: Identifier,
}

impl PostgresSpecStore {
    /// Creates a store reading from the table described by `config`.
    ///
    /// The table and ordering column names are validated here since they end up in SQL.
    pub fn new(pool: PgPool, config: &SpecStoreConfig) -> SyncResult<Self> {
        let table = TableName::parse(config.table.trim())?;
        let order_by = Identifier::new(
            config
                .order_by_column
                .as_deref()
                .map(str::trim)
                .unwrap_or(DEFAULT_ORDER_BY_COLUMN),
        )?;

        Ok(Self {
            pool,
            table,
            order_by,
        })
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    fn select_query(&self) -> String {
        format!(
            "select target_table, source_table, primary_key, columns_to_merge from {} order by {}",
            self.table.as_quoted_identifier(),
            self.order_by.as_quoted_identifier()
        )
    }
}

impl SpecStore for PostgresSpecStore {
    async fn load_specs(&self) -> SyncResult<Vec<SyncSpec>> {
        let query = self.select_query();
        debug!(%query, "loading sync specs");

        let rows: Vec<SpecRow> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                sync_error!(
                    ErrorKind::ConfigStoreUnreachable,
                    "Failed to read sync specs",
                    format!("Reading '{}' failed: {err}", self.table),
                    source: err
                )
            })?;

        let specs = parse_spec_rows(&rows)?;
        info!(table = %self.table, specs = specs.len(), "loaded sync specs");

        Ok(specs)
    }
}
