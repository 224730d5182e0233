//! Benchmark harness measurements over the in-memory store

mod support;

use sluice_loader::store::{MemoryStoreOptions, StatementKind};
use sluice_loader::{Harness, ImportOptions, StrategyKind};

use support::*;

#[tokio::test]
async fn single_batch_run_counts_one_statement() {
    let csv = customers_csv(100);
    let (_memory, store) = memory_store();
    let harness = Harness::new(store);
    let importer = StrategyKind::StreamChunked
        .build(&ImportOptions::default())
        .unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();

    assert!(sample.succeeded());
    assert_eq!(sample.statement_count, Some(1));
    assert_eq!(sample.row_delta(), Some(100));
    let report = sample.report.as_ref().unwrap();
    assert_eq!(report.flushes, 1);
    assert!(sample.to_string().contains("SQL: 1 | ROWS: 100"));
}

#[tokio::test]
async fn per_record_run_counts_every_statement() {
    let csv = customers_csv(100);
    let (_memory, store) = memory_store();
    let harness = Harness::new(store);
    let importer = StrategyKind::StreamPerRecord
        .build(&ImportOptions::default())
        .unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();
    assert_eq!(sample.statement_count, Some(100));
    assert_eq!(sample.row_delta(), Some(100));
}

#[tokio::test]
async fn failed_run_still_produces_a_sample() {
    let csv = customers_csv(7_282);
    let (_memory, store) = memory_store();
    let harness = Harness::new(store);
    let importer = StrategyKind::CollectAll
        .build(&ImportOptions::default())
        .unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();

    assert!(!sample.succeeded());
    let failure = sample.failure.as_deref().unwrap();
    assert!(failure.starts_with("ParameterLimit "));
    assert_eq!(sample.row_delta(), Some(0));
    // The rejected statement still reached the store.
    assert_eq!(sample.statement_count, Some(1));
    assert!(sample.report.is_none());
}

#[tokio::test]
async fn partial_progress_is_visible_in_the_row_delta() {
    let csv = csv_with_short_line(2_500, 1_500);
    let (_memory, store) = memory_store();
    let harness = Harness::new(store);
    let importer = StrategyKind::PreparedChunked
        .build(&ImportOptions::default())
        .unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();
    assert!(sample
        .failure
        .as_deref()
        .unwrap()
        .starts_with("MalformedRecord "));
    assert_eq!(sample.row_delta(), Some(1_000));
    assert_eq!(sample.statement_count, Some(1));
}

#[tokio::test]
async fn row_delta_is_relative_to_existing_rows() {
    let csv = customers_csv(40);
    let (memory, store) = memory_store();
    let harness = Harness::new(store);
    let importer = StrategyKind::StreamChunked
        .build(&ImportOptions::default())
        .unwrap();

    harness.run(importer.as_ref(), csv.path()).await.unwrap();
    let second = harness.run(importer.as_ref(), csv.path()).await.unwrap();

    assert_eq!(second.start_row_count, Some(40));
    assert_eq!(second.end_row_count, Some(80));
    assert_eq!(second.row_delta(), Some(40));
    assert_eq!(memory.row_total(), 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partitioned_statements_sum_across_workers() {
    let csv = customers_csv(100);
    let (_memory, store) = memory_store();
    let harness = Harness::new(store);
    let options = ImportOptions {
        batch_size: 10,
        workers: 4,
    };
    let importer = StrategyKind::Partitioned.build(&options).unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();
    assert!(sample.succeeded());
    assert_eq!(sample.row_delta(), Some(100));
    // Each worker owns 25 rows: two full batches and a remainder of five.
    assert_eq!(sample.statement_count, Some(12));
}

#[tokio::test]
async fn capability_failure_writes_nothing() {
    let csv = customers_csv(10);
    let (memory, store) = memory_store_with(MemoryStoreOptions {
        local_file_load: false,
        ..MemoryStoreOptions::default()
    });
    let harness = Harness::new(store);
    let importer = StrategyKind::BulkLoad
        .build(&ImportOptions::default())
        .unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();
    assert!(sample.failure.as_deref().unwrap().starts_with("Capability "));
    assert_eq!(sample.statement_count, Some(0));
    assert!(memory.write_log().is_empty());
}

#[tokio::test]
async fn failed_counter_read_keeps_the_import_failure() {
    let csv = customers_csv(7_282);
    let (memory, store) = memory_store();
    memory.fail_reads(StatementKind::StatementCount);
    let harness = Harness::new(store);
    let importer = StrategyKind::CollectAll
        .build(&ImportOptions::default())
        .unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();

    assert_eq!(sample.statement_count, None);
    assert!(sample.to_string().contains("SQL: n/a"));
    assert!(sample.failure.as_deref().unwrap().starts_with("ParameterLimit "));
    assert_eq!(sample.row_delta(), Some(0));
}

#[tokio::test]
async fn failed_row_count_reads_render_as_na() {
    let csv = customers_csv(20);
    let (memory, store) = memory_store();
    memory.fail_reads(StatementKind::RowCount);
    let harness = Harness::new(store);
    let importer = StrategyKind::StreamChunked
        .build(&ImportOptions::default())
        .unwrap();

    let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();

    assert!(sample.succeeded());
    assert_eq!(sample.row_delta(), None);
    assert!(sample.to_string().ends_with("ROWS: n/a"));
    assert_eq!(sample.statement_count, Some(1));
    assert_eq!(memory.row_total(), 20);
}
