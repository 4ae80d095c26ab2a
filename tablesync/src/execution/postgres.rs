use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};
use tablesync_config::shared::{MergeStrategy, SyncConfig};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::execution::{RowCounts, TargetBackend};
use crate::plan::ReconciliationPlan;
use crate::plan::statement::{PostgresStatementBuilder, RenderedStatement, StatementKind};

/// [`TargetBackend`] applying plans to Postgres through a connection pool.
///
/// Each `apply` checks out its own connection and transaction, so the backend can be cloned
/// freely and shared by concurrently running table-pairs.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    builder: PostgresStatementBuilder,
    statement_timeout: Option<Duration>,
}

impl PostgresBackend {
    pub fn new(pool: PgPool, config: &SyncConfig) -> Self {
        Self {
            pool,
            builder: PostgresStatementBuilder::new(config.merge_strategy),
            statement_timeout: config.statement_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.builder.strategy()
    }

    async fn apply_in_transaction(
        &self,
        transaction: &mut Transaction<'static, Postgres>,
        statements: &[RenderedStatement],
    ) -> SyncResult<RowCounts> {
        if let Some(timeout) = self.statement_timeout {
            // `set_config` with `is_local = true` behaves like `set local` and accepts a bind.
            sqlx::query("select set_config('statement_timeout', $1, true)")
                .bind(timeout.as_millis().to_string())
                .execute(&mut **transaction)
                .await?;
        }

        let (mut inserted, mut updated, mut deleted, mut merged) = (0, 0, 0, 0);
        for statement in statements {
            debug!(kind = %statement.kind, sql = %statement.sql, "executing statement");

            let rows = sqlx::query(&statement.sql)
                .execute(&mut **transaction)
                .await?
                .rows_affected();

            match statement.kind {
                StatementKind::Update => updated += rows,
                StatementKind::Insert => inserted += rows,
                StatementKind::Delete => deleted += rows,
                StatementKind::Merge => merged += rows,
            }
        }

        match self.builder.strategy() {
            MergeStrategy::Statements => Ok(RowCounts::per_kind(inserted, updated, deleted)),
            MergeStrategy::Native => Ok(RowCounts::total_only(merged)),
        }
    }
}

impl TargetBackend for PostgresBackend {
    async fn apply(&self, plan: &ReconciliationPlan) -> SyncResult<RowCounts> {
        let statements = self.builder.render(plan);

        let mut transaction = self.pool.begin().await?;

        match self.apply_in_transaction(&mut transaction, &statements).await {
            Ok(counts) => {
                transaction.commit().await?;

                Ok(counts)
            }
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    warn!(
                        target_table = %plan.target_table,
                        error = %rollback_err,
                        "failed to roll back table-pair transaction"
                    );
                }

                Err(err)
            }
        }
    }
}
