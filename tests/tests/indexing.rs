//! The pipeline feeding the indexing stage, end to end.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use elastic::{ElasticConfig, ElasticSink};
use flow_core::RecordSink;
use ingest::{FlowTransformer, IndexStats, Indexer, LookupTables};
use integration_tests::mocks::CollectingSink;
use integration_tests::setup::{eventually, within, TestContext};
use parking_lot::Mutex;
use std::sync::Arc;

type Documents = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

fn spawn_indexer(
    sink: Arc<dyn RecordSink>,
    rx: ingest::BusReceiver,
) -> tokio::task::JoinHandle<IndexStats> {
    let indexer = Indexer::new(FlowTransformer::new(LookupTables::default()), sink);
    tokio::spawn(async move { indexer.run(rx).await })
}

#[tokio::test]
async fn test_flows_are_indexed_in_partition_order() {
    let TestContext {
        source, pipeline, rx, ..
    } = TestContext::new([0, 1], 4).await;
    let sink = CollectingSink::new();
    let indexer = spawn_indexer(Arc::new(sink.clone()), rx);

    for offset in 0..20 {
        source.push(0, offset);
        source.push(1, 100 + offset);
    }
    eventually("all flows to be indexed", || sink.record_count() == 40).await;

    let report = pipeline.shutdown().await;
    let stats = within("indexer to finish", indexer).await.unwrap();

    assert_eq!(report.delivered(), 40);
    assert_eq!(stats.received, 40);
    assert_eq!(stats.indexed, 40);
    assert_eq!(stats.decode_errors, 0);

    let records = sink.records();
    let first = &records[0];
    assert_eq!(first.src_addr, "192.168.1.10");
    assert_eq!(first.dst_addr, "8.8.8.8");
    assert_eq!(first.sampler_address, "10.0.0.254");
    assert_eq!(first.port_name, "dns");
    assert_eq!(first.proto_name, "udp");
    assert_eq!(first.etype_name, "IPv4");
    assert_eq!(first.src_mac, "5e005301");
    assert_eq!(first.time_flow_start, 1_700_000_000_000);

    // Fixture flows carry their offset as sequence number.
    let low: Vec<u32> = records
        .iter()
        .map(|r| r.sequence_num)
        .filter(|seq| *seq < 100)
        .collect();
    let high: Vec<u32> = records
        .iter()
        .map(|r| r.sequence_num)
        .filter(|seq| *seq >= 100)
        .collect();
    assert_eq!(low, (0..20).collect::<Vec<_>>());
    assert_eq!(high, (100..120).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_undecodable_payload_is_skipped_but_checkpointed() {
    let TestContext {
        source,
        store,
        pipeline,
        rx,
    } = TestContext::new([0], 4).await;
    let sink = CollectingSink::new();
    let indexer = spawn_indexer(Arc::new(sink.clone()), rx);

    source.push(0, 0);
    source.push_payload(0, 1, vec![0xff, 0xff, 0xff]);
    source.push(0, 2);

    eventually("checkpoint past the bad payload", || {
        store.committed_offset(0) == Some(3)
    })
    .await;

    pipeline.shutdown().await;
    let stats = within("indexer to finish", indexer).await.unwrap();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.decode_errors, 1);
    assert_eq!(stats.indexed, 2);
    let sequences: Vec<u32> = sink.records().iter().map(|r| r.sequence_num).collect();
    assert_eq!(sequences, vec![0, 2]);
}

#[tokio::test]
async fn test_sink_failures_do_not_stall_consumption() {
    let TestContext {
        source, pipeline, rx, ..
    } = TestContext::new([0], 4).await;
    let sink = CollectingSink::new();
    sink.set_should_fail(true);
    let indexer = spawn_indexer(Arc::new(sink.clone()), rx);

    for offset in 0..10 {
        source.push(0, offset);
    }
    eventually("all messages to be marked", || pipeline.checkpoint(0) == Some(10)).await;

    pipeline.shutdown().await;
    let stats = within("indexer to finish", indexer).await.unwrap();

    assert_eq!(stats.received, 10);
    assert_eq!(stats.index_errors, 10);
    assert_eq!(sink.record_count(), 0);
}

async fn accept(
    State(documents): State<Documents>,
    Path(index): Path<String>,
    Json(doc): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    documents.lock().push((index, doc));
    (StatusCode::CREATED, Json(serde_json::json!({"result": "created"})))
}

async fn cluster_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({"cluster_name": "test", "version": {"number": "8.13.0"}}))
}

/// Minimal Elasticsearch stand-in on an ephemeral port.
async fn fake_elasticsearch(documents: Documents) -> String {
    let router = Router::new()
        .route("/", get(cluster_info))
        .route("/:index/_doc", post(accept))
        .with_state(documents);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_flows_reach_elasticsearch() {
    let documents = Documents::default();
    let url = fake_elasticsearch(documents.clone()).await;
    let sink = ElasticSink::new(ElasticConfig {
        url,
        index: "flows-test".into(),
        ..Default::default()
    })
    .unwrap();
    assert!(elastic::health::check_connection(&sink).await);

    let TestContext {
        source, pipeline, rx, ..
    } = TestContext::new([0, 1, 2], 8).await;
    let indexer = spawn_indexer(Arc::new(sink), rx);

    source.push(0, 10);
    source.push(1, 11);
    source.push(2, 12);
    eventually("three documents", || documents.lock().len() == 3).await;

    pipeline.shutdown().await;
    let stats = within("indexer to finish", indexer).await.unwrap();
    assert_eq!(stats.indexed, 3);

    let documents = documents.lock();
    assert!(documents.iter().all(|(index, _)| index == "flows-test"));
    let mut sequences: Vec<u64> = documents
        .iter()
        .map(|(_, doc)| doc["sequence_num"].as_u64().unwrap())
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![10, 11, 12]);
    assert_eq!(documents[0].1["dst_addr"], "8.8.8.8");
    assert_eq!(documents[0].1["timestamp"], 1_700_000_000_000u64);
}
