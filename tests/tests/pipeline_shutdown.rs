//! Shutdown sequencing: idempotence, draining and the worker barrier.

use ingest::WorkerExit;
use integration_tests::setup::{eventually, within, TestContext, WAIT};
use std::time::Duration;

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let mut ctx = TestContext::new([0, 1], 4).await;
    ctx.source.push(0, 1);
    ctx.recv().await;

    let first = ctx.pipeline.shutdown().await;
    let second = ctx.pipeline.shutdown().await;

    assert_eq!(first, second);
    assert_eq!(ctx.source.close_calls(), 1);
    assert!(ctx.drain().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_shutdowns_share_one_sequence() {
    let ctx = TestContext::new([0, 1, 2], 4).await;

    let (a, b, c) = tokio::join!(
        ctx.pipeline.shutdown(),
        ctx.pipeline.shutdown(),
        ctx.pipeline.shutdown()
    );

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.workers.len(), 3);
    assert_eq!(ctx.source.close_calls(), 1);
}

#[tokio::test]
async fn test_idle_workers_stop_promptly() {
    let ctx = TestContext::new([0, 1, 2, 3], 4).await;
    assert!(!ctx.pipeline.is_shutting_down());

    let report = within("idle pipeline to stop", ctx.pipeline.shutdown()).await;

    assert!(ctx.pipeline.is_shutting_down());
    assert_eq!(report.workers.len(), 4);
    assert!(report.workers.iter().all(|w| w.exit == WorkerExit::Shutdown));
    assert!(report.checkpoints.is_empty());
    assert_eq!(ctx.pipeline.active_workers(), 0);
}

#[tokio::test]
async fn test_buffered_messages_drain_before_close() {
    let mut ctx = TestContext::new([0], 8).await;
    for offset in 0..3 {
        ctx.source.push(0, offset);
    }
    eventually("messages to reach the bus", || ctx.rx.len() == 3).await;

    ctx.pipeline.shutdown().await;

    let drained: Vec<i64> = ctx.drain().await.iter().map(|m| m.offset).collect();
    assert_eq!(drained, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_in_flight_message_is_delivered() {
    let TestContext {
        source,
        pipeline,
        mut rx,
        ..
    } = TestContext::new([0], 1).await;

    for offset in 0..3 {
        source.push(0, offset);
    }
    // Offset 0 fills the bus; the worker holds offset 1 waiting for room.
    eventually("bus to fill", || rx.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reader = async {
        let mut offsets = Vec::new();
        while let Some(msg) = rx.recv().await {
            offsets.push(msg.offset);
        }
        offsets
    };
    let (report, offsets) = within("shutdown with a full bus", async {
        tokio::join!(pipeline.shutdown(), reader)
    })
    .await;

    assert_eq!(offsets, vec![0, 1]);
    assert_eq!(report.workers[0].delivered, 2);
    assert_eq!(report.workers[0].checkpoint, Some(2));
}

#[tokio::test]
async fn test_zero_partitions_idle_until_shutdown() {
    let mut ctx = TestContext::new([], 4).await;
    assert!(ctx.pipeline.assignment().is_empty());
    assert_eq!(ctx.pipeline.active_workers(), 0);

    // The bus stays open without any writers.
    let idle = tokio::time::timeout(Duration::from_millis(50), ctx.rx.recv()).await;
    assert!(idle.is_err());

    let report = ctx.pipeline.shutdown().await;
    assert!(report.workers.is_empty());
    assert!(ctx.drain().await.is_empty());
    assert_eq!(ctx.source.close_calls(), 1);
}

#[tokio::test]
async fn test_held_commits_do_not_delay_end_of_stream() {
    let TestContext {
        source,
        store,
        pipeline,
        mut rx,
    } = TestContext::new([0, 1], 4).await;

    store.hold_commits();
    source.push(0, 0);
    assert_eq!(within("first message", rx.recv()).await.map(|m| m.offset), Some(0));

    let shutdown = pipeline.shutdown();
    tokio::pin!(shutdown);

    // The reader observes the end of the stream while the commit is stuck.
    let drained = within("end of stream", async {
        tokio::select! {
            _ = &mut shutdown => panic!("shutdown finished before commits were released"),
            rest = async {
                let mut rest = Vec::new();
                while let Some(msg) = rx.recv().await {
                    rest.push(msg);
                }
                rest
            } => rest,
        }
    })
    .await;
    assert!(drained.is_empty());
    assert_eq!(pipeline.active_workers(), 0);
    assert_eq!(source.close_calls(), 1);
    assert_eq!(store.committed_offset(0), None);

    store.release_commits();
    let report = tokio::time::timeout(WAIT, shutdown).await.unwrap();
    assert_eq!(store.committed_offset(0), Some(1));
    let flushed = report.workers.iter().find(|w| w.partition == 0).unwrap();
    assert_eq!(flushed.committed, Some(1));
}

#[tokio::test]
async fn test_source_released_after_workers() {
    let ctx = TestContext::new([0, 1, 2], 4).await;
    assert_eq!(ctx.source.close_calls(), 0);

    ctx.pipeline.shutdown().await;

    assert_eq!(ctx.pipeline.active_workers(), 0);
    for partition in 0..3 {
        assert!(ctx.source.cursor_dropped(partition), "partition {}", partition);
    }
    assert_eq!(ctx.source.close_calls(), 1);
}
