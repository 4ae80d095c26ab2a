use sqlx::PgPool;
use tablesync::error::ErrorKind;
use tablesync::execution::{PostgresBackend, RowCounts};
use tablesync::record::MemoryRecordSink;
use tablesync::run::{RunConfig, SyncRun};
use tablesync::store::spec::PostgresSpecStore;
use tablesync::test_utils::database::{TestDatabase, spawn_target_database, test_table_name};
use tablesync_config::shared::{MergeStrategy, SpecStoreConfig, SyncConfig};
use tablesync_telemetry::tracing::init_test_tracing;

const SPEC_TABLE: &str = "test.merge_config";

async fn setup_orders(database: &TestDatabase) {
    database
        .execute(
            "create table test.orders (id bigint primary key, label text not null);
             create table test.stg_orders (id bigint, label text not null);
             insert into test.orders values (1, 'A'), (2, 'B');
             insert into test.stg_orders values (1, 'A'), (3, 'C');
             create table test.merge_config (
                 row_id serial,
                 target_table text,
                 source_table text,
                 primary_key text,
                 columns_to_merge text
             );",
        )
        .await;
}

async fn add_spec(database: &TestDatabase, target: &str, source: &str, columns: Option<&str>) {
    sqlx::query(
        "insert into test.merge_config (target_table, source_table, primary_key, columns_to_merge)
         values ($1, $2, 'id', $3)",
    )
    .bind(target)
    .bind(source)
    .bind(columns)
    .execute(&database.pool)
    .await
    .expect("Failed to insert sync spec");
}

async fn table_rows(pool: &PgPool, table: &str) -> Vec<(i64, String)> {
    sqlx::query_as(&format!("select id, label from {table} order by id"))
        .fetch_all(pool)
        .await
        .expect("Failed to read table")
}

fn sync_run(
    database: &TestDatabase,
    sync: &SyncConfig,
) -> SyncRun<PostgresSpecStore, PostgresBackend, MemoryRecordSink> {
    let store_config = SpecStoreConfig {
        table: SPEC_TABLE.to_string(),
        order_by_column: Some("row_id".to_string()),
    };
    let store = PostgresSpecStore::new(database.pool.clone(), &store_config)
        .expect("Invalid spec store config");
    let backend = PostgresBackend::new(database.pool.clone(), sync);

    SyncRun::new(RunConfig::from(sync), store, backend, MemoryRecordSink::new())
}

async fn server_version_num(pool: &PgPool) -> i32 {
    let version: String = sqlx::query_scalar("show server_version_num")
        .fetch_one(pool)
        .await
        .expect("Failed to read server version");

    version.parse().expect("Invalid server version")
}

#[tokio::test(flavor = "multi_thread")]
async fn statements_strategy_reconciles_and_is_idempotent() {
    init_test_tracing();
    let database = spawn_target_database().await;
    setup_orders(&database).await;
    add_spec(&database, "test.orders", "test.stg_orders", Some("id,label")).await;

    let run = sync_run(&database, &SyncConfig::default());

    let first = run.run().await.unwrap();
    assert_eq!(first.succeeded(), 1);
    assert_eq!(first.outcomes[0].rows_affected(), RowCounts::per_kind(1, 0, 1));
    assert_eq!(
        table_rows(&database.pool, "test.orders").await,
        table_rows(&database.pool, "test.stg_orders").await
    );

    database
        .execute("update test.stg_orders set label = 'a' where id = 1")
        .await;
    let second = run.run().await.unwrap();
    assert_eq!(second.outcomes[0].rows_affected(), RowCounts::per_kind(0, 1, 0));

    let third = run.run().await.unwrap();
    assert_eq!(third.total_rows(), 0);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_list_without_key_inserts_updates_and_settles() {
    init_test_tracing();
    let database = spawn_target_database().await;
    setup_orders(&database).await;
    add_spec(&database, "test.orders", "test.stg_orders", Some("label")).await;

    let run = sync_run(&database, &SyncConfig::default());

    let first = run.run().await.unwrap();
    assert_eq!(first.succeeded(), 1);
    assert_eq!(first.outcomes[0].rows_affected(), RowCounts::per_kind(1, 0, 1));
    assert_eq!(
        table_rows(&database.pool, "test.orders").await,
        vec![(1, "A".to_string()), (3, "C".to_string())]
    );

    database
        .execute("update test.stg_orders set label = 'X' where id = 1")
        .await;
    let second = run.run().await.unwrap();
    assert_eq!(second.outcomes[0].rows_affected(), RowCounts::per_kind(0, 1, 0));
    assert_eq!(
        table_rows(&database.pool, "test.orders").await,
        vec![(1, "X".to_string()), (3, "C".to_string())]
    );

    let third = run.run().await.unwrap();
    assert_eq!(third.total_rows(), 0);

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_pair_rolls_back_and_others_continue() {
    init_test_tracing();
    let database = spawn_target_database().await;
    setup_orders(&database).await;
    database
        .execute(
            "create table test.customers (id bigint primary key, label text not null);
             create table test.stg_customers (id bigint, label text);
             insert into test.customers values (1, 'A');
             insert into test.stg_customers values (2, null);",
        )
        .await;
    add_spec(&database, "test.customers", "test.stg_customers", Some("id,label")).await;
    add_spec(&database, "test.missing", "test.stg_missing", Some("id,label")).await;
    add_spec(&database, "test.orders", "test.stg_orders", Some("id,label")).await;

    let report = sync_run(&database, &SyncConfig::default()).run().await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::ConstraintViolation)
    );
    assert_eq!(
        report.outcomes[1].error_kind(),
        Some(ErrorKind::TargetTableMissing)
    );
    assert!(report.outcomes[2].is_succeeded());

    assert_eq!(
        table_rows(&database.pool, "test.customers").await,
        vec![(1, "A".to_string())]
    );

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_spec_row_aborts_the_run() {
    init_test_tracing();
    let database = spawn_target_database().await;
    setup_orders(&database).await;
    add_spec(&database, "test.orders", "test.stg_orders", Some("id,label")).await;
    add_spec(&database, "test.other", "test.stg_other", Some("id,label; drop table test.orders")).await;

    let err = sync_run(&database, &SyncConfig::default())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedSpec);
    assert_eq!(
        table_rows(&database.pool, "test.orders").await,
        vec![(1, "A".to_string()), (2, "B".to_string())]
    );

    database.drop_database().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn native_merge_strategy_matches_statements() {
    init_test_tracing();
    let database = spawn_target_database().await;
    if server_version_num(&database.pool).await < 170_000 {
        database.drop_database().await;
        return;
    }
    setup_orders(&database).await;
    add_spec(&database, "test.orders", "test.stg_orders", Some("id,label")).await;

    let sync = SyncConfig {
        merge_strategy: MergeStrategy::Native,
        statement_timeout_ms: Some(10_000),
        ..SyncConfig::default()
    };
    let report = sync_run(&database, &sync).run().await.unwrap();

    assert_eq!(report.outcomes[0].rows_affected(), RowCounts::total_only(2));
    assert_eq!(
        table_rows(&database.pool, "test.orders").await,
        vec![(1, "A".to_string()), (3, "C".to_string())]
    );

    database.drop_database().await;
}

#[test]
fn test_table_names_live_in_test_schema() {
    assert_eq!(test_table_name("orders").to_string(), "test.orders");
}
