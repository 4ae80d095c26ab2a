//! Coordination of a sync run.
//!
//! A run loads the spec set once, then drives every table-pair through
//! `Pending -> Planning -> Executing -> Succeeded | Failed`. Failures of one pair never stop
//! the others. Only a spec set that cannot be loaded aborts the run.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tablesync_config::shared::{MergeStrategy, SyncConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, SyncResult};
use crate::execution::{ExecutionDriver, ExecutionOutcome, TargetBackend};
use crate::plan::plan;
use crate::plan::statement::PostgresStatementBuilder;
use crate::record::RunRecordSink;
use crate::spec::SyncSpec;
use crate::store::spec::SpecStore;
use crate::sync_error;

/// Settings of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// `1` reconciles pairs one after the other, in spec order.
    pub max_parallel_tables: u16,
    pub merge_strategy: MergeStrategy,
    /// Plans and renders every pair without touching the target.
    pub dry_run: bool,
}

impl RunConfig {
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl From<&SyncConfig> for RunConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_parallel_tables: config.max_parallel_tables,
            merge_strategy: config.merge_strategy,
            dry_run: false,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// Lifecycle of a table-pair within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePairPhase {
    Pending,
    Planning,
    Executing,
    Succeeded,
    Failed,
}

impl fmt::Display for TablePairPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TablePairPhase::Pending => f.write_str("pending"),
            TablePairPhase::Planning => f.write_str("planning"),
            TablePairPhase::Executing => f.write_str("executing"),
            TablePairPhase::Succeeded => f.write_str("succeeded"),
            TablePairPhase::Failed => f.write_str("failed"),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One entry per attempted pair. In spec order only for sequential runs.
    pub outcomes: Vec<ExecutionOutcome>,
    pub duration: Duration,
    /// Shutdown was requested before every pair finished.
    pub canceled: bool,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn total_rows(&self) -> u64 {
        self.outcomes.iter().map(|o| o.rows_affected().total()).sum()
    }
}

/// A single sync run over the spec set of `store`.
#[derive(Debug)]
pub struct SyncRun<S, B, R> {
    config: RunConfig,
    store: S,
    driver: ExecutionDriver<B>,
    sink: R,
    shutdown_tx: ShutdownTx,
}

impl<S, B, R> SyncRun<S, B, R>
where
    S: SpecStore + Send + Sync,
    B: TargetBackend + Clone + Send + Sync + 'static,
    R: RunRecordSink + Send + Sync,
{
    pub fn new(config: RunConfig, store: S, backend: B, sink: R) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config,
            store,
            driver: ExecutionDriver::new(backend),
            sink,
            shutdown_tx,
        }
    }

    /// Returns a handle that cancels the run.
    ///
    /// The pair being executed is rolled back and recorded as failed, pairs not yet started
    /// are skipped.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every table-pair once.
    ///
    /// Fails only when the spec set cannot be loaded, in which case no pair is attempted.
    /// Every other failure is reported through the outcomes.
    pub async fn run(&self) -> SyncResult<RunReport> {
        let started = Instant::now();

        let specs = self.store.load_specs().await.inspect_err(|err| {
            error!(error = %err, "failed to load sync specs, no table-pair was attempted");
        })?;

        info!(
            tables = specs.len(),
            max_parallel_tables = self.config.max_parallel_tables,
            dry_run = self.config.dry_run,
            "starting sync run"
        );

        let shutdown_rx = self.shutdown_tx.subscribe();
        let outcomes = if self.config.max_parallel_tables <= 1 {
            self.run_sequential(specs, shutdown_rx.clone()).await
        } else {
            self.run_parallel(specs, shutdown_rx.clone()).await
        };

        let report = RunReport {
            outcomes,
            duration: started.elapsed(),
            canceled: shutdown_rx.is_shutdown(),
        };
        // A shutdown ends this run only, the next `run` starts from a clean channel.
        self.shutdown_tx.reset();
        self.sink.finish(&report);

        Ok(report)
    }

    fn pair_context(&self, shutdown_rx: ShutdownRx) -> PairContext<B> {
        PairContext {
            driver: self.driver.clone(),
            builder: PostgresStatementBuilder::new(self.config.merge_strategy),
            dry_run: self.config.dry_run,
            shutdown_rx,
        }
    }

    async fn run_sequential(
        &self,
        specs: Vec<SyncSpec>,
        shutdown_rx: ShutdownRx,
    ) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::with_capacity(specs.len());

        for spec in specs {
            if shutdown_rx.is_shutdown() {
                info!("shutdown requested, skipping the remaining table-pairs");
                break;
            }

            let outcome = reconcile_pair(spec, self.pair_context(shutdown_rx.clone())).await;
            self.sink.record(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn run_parallel(
        &self,
        specs: Vec<SyncSpec>,
        mut shutdown_rx: ShutdownRx,
    ) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::with_capacity(specs.len());
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_tables as usize));
        let mut join_set = JoinSet::new();

        for spec in specs {
            // Waiting for a permit must not delay the reaction to a shutdown.
            let permit = tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested, skipping the remaining table-pairs");
                    break;
                }
                permit = permits.clone().acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };

            let source_table = spec.source_table.clone();
            let target_table = spec.target_table.clone();
            let context = self.pair_context(shutdown_rx.clone());

            join_set.spawn(async move {
                let _permit = permit;

                AssertUnwindSafe(reconcile_pair(spec, context))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        ExecutionOutcome::failed(
                            source_table,
                            target_table,
                            Duration::ZERO,
                            sync_error!(ErrorKind::Unknown, "Table-pair task panicked"),
                        )
                    })
            });

            // Outcomes of finished pairs are recorded while later pairs wait for permits.
            while let Some(result) = join_set.try_join_next() {
                self.collect(result, &mut outcomes);
            }
        }

        while let Some(result) = join_set.join_next().await {
            self.collect(result, &mut outcomes);
        }

        outcomes
    }

    fn collect(
        &self,
        result: Result<ExecutionOutcome, tokio::task::JoinError>,
        outcomes: &mut Vec<ExecutionOutcome>,
    ) {
        match result {
            Ok(outcome) => {
                self.sink.record(&outcome);
                outcomes.push(outcome);
            }
            Err(err) => error!(error = %err, "table-pair task did not complete"),
        }
    }
}

/// What a single table-pair needs, detached from the run so it can be spawned.
struct PairContext<B> {
    driver: ExecutionDriver<B>,
    builder: PostgresStatementBuilder,
    dry_run: bool,
    shutdown_rx: ShutdownRx,
}

async fn reconcile_pair<B>(spec: SyncSpec, mut context: PairContext<B>) -> ExecutionOutcome
where
    B: TargetBackend,
{
    let started = Instant::now();
    let target_table = spec.target_table.clone();
    let source_table = spec.source_table.clone();
    debug!(%target_table, phase = %TablePairPhase::Pending, "table-pair queued");

    debug!(%target_table, phase = %TablePairPhase::Planning, "planning table-pair");
    let plan = match plan(&spec) {
        Ok(plan) => plan,
        Err(err) => {
            warn!(%target_table, phase = %TablePairPhase::Failed, error = %err, "planning failed");

            return ExecutionOutcome::failed(source_table, target_table, started.elapsed(), err);
        }
    };

    if context.dry_run {
        for statement in context.builder.render(&plan) {
            info!(%target_table, kind = %statement.kind, sql = %statement.sql, "dry run statement");
        }

        return ExecutionOutcome::dry_run(source_table, target_table, started.elapsed());
    }

    debug!(%target_table, phase = %TablePairPhase::Executing, mode = %plan.mode(), "executing table-pair");
    let outcome = tokio::select! {
        biased;

        _ = context.shutdown_rx.wait_for_shutdown() => {
            ExecutionOutcome::failed(
                source_table,
                target_table.clone(),
                started.elapsed(),
                sync_error!(
                    ErrorKind::OperationCanceled,
                    "Table-pair interrupted by shutdown",
                    "canceled"
                ),
            )
        }
        outcome = context.driver.execute(&plan) => outcome,
    };

    let phase = if outcome.is_succeeded() {
        TablePairPhase::Succeeded
    } else {
        TablePairPhase::Failed
    };
    debug!(%target_table, %phase, "table-pair finished");

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::execution::{MemoryBackend, MemoryTable, RowCounts};
    use crate::record::MemoryRecordSink;
    use crate::spec::SpecRow;
    use crate::store::spec::MemorySpecStore;

    #[test]
    fn run_config_follows_sync_config() {
        let sync = SyncConfig {
            max_parallel_tables: 4,
            merge_strategy: MergeStrategy::Native,
            statement_timeout_ms: None,
        };

        let config = RunConfig::from(&sync).with_dry_run(true);
        assert_eq!(config.max_parallel_tables, 4);
        assert_eq!(config.merge_strategy, MergeStrategy::Native);
        assert!(config.dry_run);
    }

    #[tokio::test]
    async fn dry_run_leaves_tables_untouched() {
        let backend = MemoryBackend::new();
        let target = MemoryTable::new(&["id"]).with_rows(vec![vec![json!(1)]]);
        backend.create_table("orders", target.clone()).await.unwrap();
        backend
            .create_table("stg_orders", MemoryTable::new(&["id"]))
            .await
            .unwrap();

        let store = MemorySpecStore::new(vec![SpecRow::new("orders", "stg_orders", "id", Some("id"))]);
        let sink = MemoryRecordSink::new();
        let run = SyncRun::new(
            RunConfig::default().with_dry_run(true),
            store,
            backend.clone(),
            sink.clone(),
        );

        let report = run.run().await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.total_rows(), 0);
        assert!(report.outcomes[0].is_dry_run());
        assert!(sink.messages()[0].starts_with("Dry run of public.stg_orders into public.orders at "));
        assert_eq!(backend.table("orders").await.unwrap(), Some(target));
        assert!(sink.is_finished());
    }

    #[tokio::test]
    async fn planning_failure_is_recorded_per_pair() {
        let store = MemorySpecStore::new(vec![SpecRow::new(
            "orders",
            "public.orders",
            "id",
            Some("id"),
        )]);
        let run = SyncRun::new(
            RunConfig::default(),
            store,
            MemoryBackend::new(),
            MemoryRecordSink::new(),
        );

        let report = run.run().await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.outcomes[0].error_kind(),
            Some(ErrorKind::SourceIsTarget)
        );
    }

    #[tokio::test]
    async fn canceled_run_does_not_cancel_the_next_one() {
        let backend = MemoryBackend::new();
        backend
            .create_table("orders", MemoryTable::new(&["id"]))
            .await
            .unwrap();
        backend
            .create_table(
                "stg_orders",
                MemoryTable::new(&["id"]).with_rows(vec![vec![json!(1)]]),
            )
            .await
            .unwrap();

        let store = MemorySpecStore::new(vec![SpecRow::new("orders", "stg_orders", "id", Some("id"))]);
        let run = SyncRun::new(
            RunConfig::default(),
            store,
            backend.clone(),
            MemoryRecordSink::new(),
        );

        run.shutdown_tx().shutdown();
        let canceled = run.run().await.unwrap();
        assert!(canceled.canceled);
        assert!(canceled.outcomes.is_empty());

        let next = run.run().await.unwrap();
        assert!(!next.canceled);
        assert_eq!(next.succeeded(), 1);
        assert_eq!(next.outcomes[0].rows_affected(), RowCounts::per_kind(1, 0, 0));
    }
}
