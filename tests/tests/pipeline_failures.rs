//! Failure handling: startup errors, per-partition failures, offset store
//! trouble and backpressure.

use flow_core::Error;
use ingest::{IngestionPipeline, WorkerExit};
use integration_tests::fixtures;
use integration_tests::mocks::{MockOffsetStore, MockSource};
use integration_tests::setup::{eventually, TestContext};
use std::sync::Arc;
use std::time::Duration;

async fn start_err(source: &MockSource, store: MockOffsetStore) -> Error {
    match IngestionPipeline::start(
        Arc::new(source.clone()),
        Arc::new(store),
        fixtures::pipeline_config(4),
    )
    .await
    {
        Ok(_) => panic!("start must fail"),
        Err(e) => e,
    }
}

#[tokio::test]
async fn test_discovery_failure_spawns_nothing() {
    let source = MockSource::new(fixtures::TOPIC, [0, 1]);
    source.set_fail_discovery("broker unreachable");

    let err = start_err(&source, MockOffsetStore::new()).await;

    assert!(matches!(err, Error::Discovery { .. }));
    assert!(source.opened().is_empty());
}

#[tokio::test]
async fn test_offset_store_failure_spawns_nothing() {
    let source = MockSource::new(fixtures::TOPIC, [0, 1]);
    let store = MockOffsetStore::new();
    store.set_fail_reads(true);

    let err = start_err(&source, store).await;

    assert!(matches!(err, Error::OffsetStore(_)));
    assert!(source.opened().is_empty());
}

#[tokio::test]
async fn test_cursor_failure_leaves_no_partial_worker_set() {
    let source = MockSource::new(fixtures::TOPIC, [0, 1, 2]);
    source.set_fail_open(2);

    let err = start_err(&source, MockOffsetStore::new()).await;

    assert!(matches!(err, Error::Connection(_)));
    // Cursors opened before the failure were released, never run.
    assert!(source.cursor_dropped(0));
    assert!(source.cursor_dropped(1));
}

#[tokio::test]
async fn test_failed_partition_does_not_stop_others() {
    let mut ctx = TestContext::new([0, 1, 2], 8).await;

    ctx.source.push(1, 0);
    ctx.source.end(1);
    assert_eq!(ctx.recv().await.partition, 1);
    eventually("partition 1 to stop", || ctx.pipeline.active_workers() == 2).await;

    for offset in 0..5 {
        ctx.source.push(0, offset);
        ctx.source.push(2, offset);
    }
    let received = ctx.recv_n(10).await;
    assert!(received.iter().all(|m| m.partition != 1));

    let report = ctx.pipeline.shutdown().await;
    let exits: Vec<_> = report.workers.iter().map(|w| (w.partition, w.exit)).collect();
    assert!(exits.contains(&(0, WorkerExit::Shutdown)));
    assert!(exits.contains(&(1, WorkerExit::SourceClosed)));
    assert!(exits.contains(&(2, WorkerExit::Shutdown)));
    assert_eq!(report.errors_reported, 1);
    assert_eq!(ctx.pipeline.checkpoint(1), Some(1));
}

#[tokio::test]
async fn test_fatal_source_error_stops_only_its_partition() {
    let mut ctx = TestContext::new([0, 1], 8).await;

    ctx.source
        .push_error(0, Error::source_fatal(0, "unknown topic or partition"));
    eventually("partition 0 to stop", || ctx.pipeline.active_workers() == 1).await;

    ctx.source.push(1, 9);
    assert_eq!(ctx.recv().await.offset, 9);

    let report = ctx.pipeline.shutdown().await;
    let failed = report.workers.iter().find(|w| w.partition == 0).unwrap();
    assert_eq!(failed.exit, WorkerExit::Failed);
    assert_eq!(failed.checkpoint, None);
}

#[tokio::test]
async fn test_transient_errors_are_reported_not_fatal() {
    let mut ctx = TestContext::new([0], 8).await;

    ctx.source.push_error(0, Error::source(0, "request timed out"));
    ctx.source.push_error(0, Error::source(0, "not leader for partition"));
    ctx.source.push(0, 3);

    assert_eq!(ctx.recv().await.offset, 3);
    assert_eq!(ctx.pipeline.active_workers(), 1);

    let report = ctx.pipeline.shutdown().await;
    assert_eq!(report.errors_reported, 2);
    assert_eq!(report.workers[0].exit, WorkerExit::Shutdown);
}

#[tokio::test]
async fn test_slow_offset_store_never_blocks_delivery() {
    let mut ctx = TestContext::new([0], 4).await;
    ctx.store.hold_commits();

    for offset in 0..100 {
        ctx.source.push(0, offset);
    }
    let received = ctx.recv_n(100).await;
    assert_eq!(received.last().map(|m| m.offset), Some(99));
    eventually("the last mark", || ctx.pipeline.checkpoint(0) == Some(100)).await;
    assert_eq!(ctx.store.committed_offset(0), None);

    ctx.store.release_commits();
    let store = ctx.store.clone();
    eventually("the latest checkpoint to be committed", || {
        store.committed_offset(0) == Some(100)
    })
    .await;

    // Held-back marks coalesce instead of queueing one commit per message.
    assert!(ctx.store.commit_attempts() < 100);
    ctx.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_failing_offset_store_is_tolerated() {
    let mut ctx = TestContext::new([0], 4).await;
    ctx.store.set_fail_commits(true);

    for offset in 0..5 {
        ctx.source.push(0, offset);
    }
    assert_eq!(ctx.recv_n(5).await.len(), 5);

    let store = ctx.store.clone();
    eventually("a commit attempt", || store.commit_attempts() > 0).await;

    let report = ctx.pipeline.shutdown().await;
    assert_eq!(report.workers[0].delivered, 5);
    assert_eq!(report.workers[0].checkpoint, Some(5));
    assert_eq!(report.workers[0].committed, None);
    assert_eq!(ctx.store.committed_offset(0), None);
}

#[tokio::test]
async fn test_stalled_reader_blocks_all_writers() {
    const CAPACITY: usize = 4;
    let mut ctx = TestContext::new([0, 1], CAPACITY).await;

    for offset in 0..50 {
        ctx.source.push(0, offset);
        ctx.source.push(1, offset);
    }

    eventually("bus to fill", || ctx.rx.len() == CAPACITY).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Only what fits on the bus has been handed off; the rest waits upstream.
    let delivered = |ctx: &TestContext| -> i64 {
        [0, 1]
            .iter()
            .map(|p| ctx.pipeline.checkpoint(*p).unwrap_or(0))
            .sum()
    };
    assert_eq!(ctx.rx.len(), CAPACITY);
    assert_eq!(delivered(&ctx), CAPACITY as i64);

    // Once the reader resumes every message arrives, in order per partition.
    let received = ctx.recv_n(100).await;
    for partition in [0, 1] {
        let offsets: Vec<i64> = received
            .iter()
            .filter(|m| m.partition == partition)
            .map(|m| m.offset)
            .collect();
        assert_eq!(offsets, (0..50).collect::<Vec<_>>());
    }

    ctx.pipeline.shutdown().await;
}
