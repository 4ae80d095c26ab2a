use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tablesync_config::shared::{IntoConnectOptions, PgConnectionConfig, TABLESYNC_TARGET_OPTIONS};
use tracing::debug;

#[cfg(feature = "test-utils")]
pub mod test_utils;

/// Connects to the target database with a pool sized for `max_connections` table-pairs.
///
/// Every table-pair checks out its own connection for the duration of its transaction,
/// so the pool must hold at least as many connections as pairs processed in parallel.
pub async fn connect_to_target_database(
    config: &PgConnectionConfig,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let options = config.with_db(Some(&TABLESYNC_TARGET_OPTIONS));

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    debug!(
        host = %config.host,
        database = %config.name,
        max_connections,
        "connected to target database"
    );

    Ok(pool)
}
