use std::time::Duration;

use serde_json::{Value, json};
use tablesync::error::{ErrorKind, ErrorStage};
use tablesync::execution::{MemoryBackend, MemoryTable, OutcomeStatus, RowCounts};
use tablesync::record::MemoryRecordSink;
use tablesync::run::{RunConfig, SyncRun};
use tablesync::spec::SpecRow;
use tablesync::store::spec::MemorySpecStore;
use tablesync_telemetry::tracing::init_test_tracing;

fn rows(rows: &[(i64, &str)]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|(id, label)| vec![json!(id), json!(label)])
        .collect()
}

fn table(data: &[(i64, &str)]) -> MemoryTable {
    MemoryTable::new(&["id", "label"])
        .with_primary_key(&["id"])
        .with_rows(rows(data))
}

async fn backend_with_pair(target: &str, target_rows: &[(i64, &str)], source_rows: &[(i64, &str)]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    add_pair(&backend, target, target_rows, source_rows).await;
    backend
}

async fn add_pair(
    backend: &MemoryBackend,
    target: &str,
    target_rows: &[(i64, &str)],
    source_rows: &[(i64, &str)],
) {
    backend.create_table(target, table(target_rows)).await.unwrap();
    backend
        .create_table(&format!("stg_{target}"), table(source_rows))
        .await
        .unwrap();
}

fn spec(target: &str) -> SpecRow {
    SpecRow::new(target, format!("stg_{target}"), "id", Some("id,label"))
}

/// A spec merging `label` only. The `id` key is inserted anyway.
fn label_spec(target: &str) -> SpecRow {
    SpecRow::new(target, format!("stg_{target}"), "id", Some("label"))
}

fn run_with(
    config: RunConfig,
    specs: Vec<SpecRow>,
    backend: &MemoryBackend,
) -> (SyncRun<MemorySpecStore, MemoryBackend, MemoryRecordSink>, MemoryRecordSink) {
    let sink = MemoryRecordSink::new();
    let run = SyncRun::new(
        config,
        MemorySpecStore::new(specs),
        backend.clone(),
        sink.clone(),
    );

    (run, sink)
}

async fn sorted_rows(backend: &MemoryBackend, name: &str) -> Vec<Vec<Value>> {
    backend.table(name).await.unwrap().unwrap().sorted_rows()
}

#[tokio::test(flavor = "multi_thread")]
async fn target_ends_up_equal_to_source() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[(1, "A"), (2, "B")], &[(1, "A"), (3, "C")]).await;
    let (run, sink) = run_with(RunConfig::default(), vec![spec("orders")], &backend);

    let report = run.run().await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.succeeded(), 1);
    assert!(!report.canceled);
    assert_eq!(
        report.outcomes[0].rows_affected(),
        RowCounts::per_kind(1, 0, 1)
    );
    assert_eq!(
        sorted_rows(&backend, "orders").await,
        sorted_rows(&backend, "stg_orders").await
    );
    assert!(sink.is_finished());
}

#[tokio::test(flavor = "multi_thread")]
async fn single_changed_row_is_one_update() {
    init_test_tracing();

    let backend = backend_with_pair(
        "customers",
        &[(1, "A"), (2, "B"), (3, "C")],
        &[(1, "A"), (2, "b"), (3, "C")],
    )
    .await;
    let (run, _) = run_with(RunConfig::default(), vec![spec("customers")], &backend);

    let report = run.run().await.unwrap();

    assert_eq!(
        report.outcomes[0].rows_affected(),
        RowCounts::per_kind(0, 1, 0)
    );
    assert_eq!(report.total_rows(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_run_changes_nothing() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[(1, "A"), (2, "B")], &[(1, "Z"), (3, "C")]).await;
    let (run, _) = run_with(RunConfig::default(), vec![spec("orders")], &backend);

    let first = run.run().await.unwrap();
    assert_eq!(first.total_rows(), 3);

    let reconciled = sorted_rows(&backend, "orders").await;
    let second = run.run().await.unwrap();

    assert_eq!(second.succeeded(), 1);
    assert_eq!(second.total_rows(), 0);
    assert_eq!(sorted_rows(&backend, "orders").await, reconciled);
}

#[tokio::test(flavor = "multi_thread")]
async fn key_columns_left_out_of_merge_list_are_still_inserted() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[(1, "A"), (3, "C")], &[(1, "A"), (2, "B")]).await;
    let (run, _) = run_with(RunConfig::default(), vec![label_spec("orders")], &backend);

    let report = run.run().await.unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(
        report.outcomes[0].rows_affected(),
        RowCounts::per_kind(1, 0, 1)
    );
    assert_eq!(
        sorted_rows(&backend, "orders").await,
        rows(&[(1, "A"), (2, "B")])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn non_key_merge_list_updates_changed_row_once() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[(1, "Y")], &[(1, "X")]).await;
    let (run, _) = run_with(RunConfig::default(), vec![label_spec("orders")], &backend);

    let first = run.run().await.unwrap();
    assert_eq!(
        first.outcomes[0].rows_affected(),
        RowCounts::per_kind(0, 1, 0)
    );
    assert_eq!(sorted_rows(&backend, "orders").await, rows(&[(1, "X")]));

    let second = run.run().await.unwrap();
    assert_eq!(second.succeeded(), 1);
    assert_eq!(second.total_rows(), 0);
    assert_eq!(sorted_rows(&backend, "orders").await, rows(&[(1, "X")]));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_only_spec_only_removes_rows() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[(1, "A"), (2, "B")], &[(1, "changed"), (3, "C")]).await;
    let delete_only = SpecRow::new("orders", "stg_orders", "id", None);
    let (run, _) = run_with(RunConfig::default(), vec![delete_only], &backend);

    let report = run.run().await.unwrap();

    assert_eq!(
        report.outcomes[0].rows_affected(),
        RowCounts::per_kind(0, 0, 1)
    );
    assert_eq!(
        sorted_rows(&backend, "orders").await,
        rows(&[(1, "A")])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_table_fails_only_its_pair() {
    init_test_tracing();

    let backend = MemoryBackend::new();
    add_pair(&backend, "first", &[(1, "A")], &[(1, "B")]).await;
    add_pair(&backend, "second", &[(1, "A")], &[(2, "B")]).await;
    add_pair(&backend, "third", &[], &[(5, "E")]).await;
    backend.drop_table("stg_second").await.unwrap();

    let specs = vec![spec("first"), spec("second"), spec("third")];
    let (run, sink) = run_with(RunConfig::default(), specs, &backend);

    let report = run.run().await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);

    let failed = &report.outcomes[1];
    assert_eq!(failed.status(), OutcomeStatus::Failed);
    assert_eq!(failed.error_kind(), Some(ErrorKind::TargetTableMissing));
    assert_eq!(failed.target_table().to_string(), "public.second");

    assert!(failed.error_detail().unwrap().contains("public.stg_second"));

    assert_eq!(sorted_rows(&backend, "first").await, rows(&[(1, "B")]));
    assert_eq!(sorted_rows(&backend, "second").await, rows(&[(1, "A")]));
    assert_eq!(sorted_rows(&backend, "third").await, rows(&[(5, "E")]));

    let messages = sink.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("Successfully loaded 1 records from public.stg_first into public.first at "));
    assert!(messages[1].starts_with("Error merging public.stg_second into public.second at "));
}

#[tokio::test(flavor = "multi_thread")]
async fn constraint_violation_rolls_back_the_pair() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[(1, "A")], &[(1, "A")]).await;
    backend
        .create_table(
            "stg_orders",
            MemoryTable::new(&["id", "label"]).with_rows(rows(&[(1, "A"), (2, "B"), (2, "C")])),
        )
        .await
        .unwrap();
    let (run, _) = run_with(RunConfig::default(), vec![spec("orders")], &backend);

    let report = run.run().await.unwrap();

    assert_eq!(
        report.outcomes[0].error_kind(),
        Some(ErrorKind::ConstraintViolation)
    );
    assert_eq!(report.outcomes[0].rows_affected().total(), 0);
    assert_eq!(sorted_rows(&backend, "orders").await, rows(&[(1, "A")]));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_spec_set_aborts_before_any_pair() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[(1, "A")], &[(2, "B")]).await;
    let malformed = SpecRow::new("customers", "stg_customers", "id", Some("id,,label"));
    let (run, sink) = run_with(
        RunConfig::default(),
        vec![spec("orders"), malformed],
        &backend,
    );

    let err = run.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedSpec);
    assert_eq!(err.stage(), ErrorStage::ConfigLoad);
    assert!(sink.outcomes().is_empty());
    assert_eq!(sorted_rows(&backend, "orders").await, rows(&[(1, "A")]));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_target_tables_abort_the_run() {
    init_test_tracing();

    let backend = backend_with_pair("orders", &[], &[]).await;
    let (run, sink) = run_with(
        RunConfig::default(),
        vec![spec("orders"), spec("orders")],
        &backend,
    );

    let err = run.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateTargetTable);
    assert!(sink.outcomes().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn parallel_run_produces_one_outcome_per_spec() {
    init_test_tracing();

    let backend = MemoryBackend::new().with_apply_delay(Duration::from_millis(5));
    let mut specs = Vec::new();
    for index in 0..8 {
        let target = format!("table_{index}");
        add_pair(&backend, &target, &[(1, "A")], &[(1, "A"), (2, "B")]).await;
        specs.push(spec(&target));
    }
    // Unknown source table, fails in isolation.
    specs.push(SpecRow::new("table_0_copy", "stg_missing", "id", Some("id,label")));

    let config = RunConfig {
        max_parallel_tables: 3,
        ..RunConfig::default()
    };
    let (run, sink) = run_with(config, specs, &backend);

    let report = run.run().await.unwrap();

    assert_eq!(report.outcomes.len(), 9);
    assert_eq!(report.succeeded(), 8);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.total_rows(), 8);
    assert_eq!(sink.outcomes().len(), 9);

    let mut targets: Vec<String> = report
        .outcomes
        .iter()
        .map(|o| o.target_table().to_string())
        .collect();
    targets.sort();
    targets.dedup();
    assert_eq!(targets.len(), 9);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_cancels_in_flight_pair_and_skips_the_rest() {
    init_test_tracing();

    let backend = MemoryBackend::new().with_apply_delay(Duration::from_secs(30));
    add_pair(&backend, "first", &[(1, "A")], &[(2, "B")]).await;
    add_pair(&backend, "second", &[(1, "A")], &[(2, "B")]).await;

    let (run, sink) = run_with(
        RunConfig::default(),
        vec![spec("first"), spec("second")],
        &backend,
    );

    let shutdown_tx = run.shutdown_tx();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.shutdown();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), run.run())
        .await
        .unwrap()
        .unwrap();

    assert!(report.canceled);
    assert_eq!(report.outcomes.len(), 1);
    let canceled = &report.outcomes[0];
    assert_eq!(canceled.error_kind(), Some(ErrorKind::OperationCanceled));
    assert!(canceled.error_detail().unwrap().contains("canceled"));

    assert_eq!(sorted_rows(&backend, "first").await, rows(&[(1, "A")]));
    assert_eq!(sorted_rows(&backend, "second").await, rows(&[(1, "A")]));
    assert_eq!(sink.outcomes().len(), 1);
}
