use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tablesync_postgres::types::TableName;
use tracing::{debug, warn};

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::execution::{RowCounts, TargetBackend};
use crate::plan::ReconciliationPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Succeeded => f.write_str("succeeded"),
            OutcomeStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Auditable result of one attempted table-pair.
///
/// A failed outcome always carries an error and a succeeded one never does.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    source_table: TableName,
    target_table: TableName,
    rows_affected: RowCounts,
    duration: Duration,
    error: Option<SyncError>,
    dry_run: bool,
    finished_at: DateTime<Utc>,
}

impl ExecutionOutcome {
    pub fn succeeded(
        source_table: TableName,
        target_table: TableName,
        rows_affected: RowCounts,
        duration: Duration,
    ) -> Self {
        Self {
            source_table,
            target_table,
            rows_affected,
            duration,
            error: None,
            dry_run: false,
            finished_at: Utc::now(),
        }
    }

    /// Outcome of a pair that was planned and rendered but not executed.
    pub fn dry_run(source_table: TableName, target_table: TableName, duration: Duration) -> Self {
        Self {
            dry_run: true,
            ..Self::succeeded(source_table, target_table, RowCounts::zero(), duration)
        }
    }

    /// Outcome of a pair that failed after `duration`. No rows are counted since the
    /// transaction did not commit.
    pub fn failed(
        source_table: TableName,
        target_table: TableName,
        duration: Duration,
        error: SyncError,
    ) -> Self {
        Self {
            source_table,
            target_table,
            rows_affected: RowCounts::zero(),
            duration,
            error: Some(error),
            dry_run: false,
            finished_at: Utc::now(),
        }
    }

    pub fn source_table(&self) -> &TableName {
        &self.source_table
    }

    pub fn target_table(&self) -> &TableName {
        &self.target_table
    }

    pub fn rows_affected(&self) -> RowCounts {
        self.rows_affected
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn status(&self) -> OutcomeStatus {
        match self.error {
            Some(_) => OutcomeStatus::Failed,
            None => OutcomeStatus::Succeeded,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status() == OutcomeStatus::Succeeded
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(SyncError::kind)
    }

    /// Single-line description of the failure.
    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(SyncError::summary)
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}

/// Applies plans to a backend and turns every result into an [`ExecutionOutcome`].
#[derive(Debug, Clone)]
pub struct ExecutionDriver<B> {
    backend: B,
}

impl<B> ExecutionDriver<B>
where
    B: TargetBackend,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Executes `plan` in one transaction.
    ///
    /// Never fails: backend errors are captured in the returned outcome. The duration spans
    /// the whole transaction, including commit or rollback.
    pub async fn execute(&self, plan: &ReconciliationPlan) -> ExecutionOutcome {
        let started = Instant::now();
        let result = self.apply(plan).await;
        let duration = started.elapsed();

        match result {
            Ok(rows_affected) => {
                debug!(
                    target_table = %plan.target_table,
                    rows = %rows_affected,
                    "table-pair reconciled"
                );

                ExecutionOutcome::succeeded(
                    plan.source_table.clone(),
                    plan.target_table.clone(),
                    rows_affected,
                    duration,
                )
            }
            Err(err) => {
                warn!(
                    target_table = %plan.target_table,
                    error = %err,
                    "table-pair reconciliation failed"
                );

                ExecutionOutcome::failed(
                    plan.source_table.clone(),
                    plan.target_table.clone(),
                    duration,
                    err,
                )
            }
        }
    }

    async fn apply(&self, plan: &ReconciliationPlan) -> SyncResult<RowCounts> {
        #[cfg(feature = "failpoints")]
        crate::failpoints::sync_fail_point(crate::failpoints::EXECUTE_PLAN__BEFORE_APPLY)?;

        self.backend.apply(plan).await
    }
}
