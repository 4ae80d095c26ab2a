use tablesync::execution::PostgresBackend;
use tablesync::record::TracingRecordSink;
use tablesync::run::{RunConfig, RunReport, SyncRun};
use tablesync::store::spec::PostgresSpecStore;
use tablesync_config::shared::{PgConnectionConfig, RunnerConfig, SpecStoreConfig, SyncConfig};
use tablesync_postgres::sqlx::connect_to_target_database;
use tracing::{debug, info, warn};

use crate::error::RunnerResult;

/// Runs every configured table-pair once against the target database.
///
/// Failures of single table-pairs end up in the returned [`RunReport`]. Only an unreachable
/// database or an unusable spec set is returned as an error.
pub async fn start_sync_with_config(config: RunnerConfig, dry_run: bool) -> RunnerResult<RunReport> {
    info!(dry_run, "starting sync run");

    log_config(&config);

    let pool = connect_to_target_database(
        &config.target,
        u32::from(config.sync.max_parallel_tables),
    )
    .await?;

    let store = PostgresSpecStore::new(pool.clone(), &config.specs)?;
    let backend = PostgresBackend::new(pool.clone(), &config.sync);
    let run_config = RunConfig::from(&config.sync).with_dry_run(dry_run);

    let sync_run = SyncRun::new(run_config, store, backend, TracingRecordSink);

    let shutdown_tx = sync_run.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        wait_for_signal().await;

        info!("shutdown signal received, canceling in-flight table-pairs");
        shutdown_tx.shutdown();
    });

    let result = sync_run.run().await;

    // The run may finish before any signal arrives.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    pool.close().await;

    Ok(result?)
}

/// Resolves on ctrl+c or, on unix, on SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler, listening for ctrl+c only");
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {
                info!("SIGINT (ctrl+c) received");
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl+c");
        std::future::pending::<()>().await;
    }
}

fn log_config(config: &RunnerConfig) {
    log_pg_connection_config(&config.target);
    log_spec_store_config(&config.specs);
    log_sync_config(&config.sync);
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "target postgres connection config",
    );
}

fn log_spec_store_config(config: &SpecStoreConfig) {
    debug!(
        table = config.table,
        order_by_column = config.order_by_column.as_deref(),
        "spec store config"
    );
}

fn log_sync_config(config: &SyncConfig) {
    debug!(
        max_parallel_tables = config.max_parallel_tables,
        merge_strategy = ?config.merge_strategy,
        statement_timeout_ms = config.statement_timeout_ms,
        "sync config"
    );
}
