//! Indexing stage: the single reader of the fan-in bus.
//!
//! Each message is decoded, transformed, optionally enriched and written to
//! the sink. Failures are logged and counted; the message is then skipped.
//! Nothing is retried.

use crate::bus::BusReceiver;
use crate::enrichment::GeoEnricher;
use crate::transform::FlowTransformer;
use flow_core::{FlowMessage, RawMessage, RecordSink};
use prost::Message;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

/// Counters of one indexer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub received: u64,
    pub decode_errors: u64,
    pub enrich_errors: u64,
    pub indexed: u64,
    pub index_errors: u64,
}

pub struct Indexer {
    transformer: FlowTransformer,
    enricher: Option<GeoEnricher>,
    sink: Arc<dyn RecordSink>,
}

impl Indexer {
    pub fn new(transformer: FlowTransformer, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            transformer,
            enricher: None,
            sink,
        }
    }

    pub fn with_enricher(mut self, enricher: Option<GeoEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    /// Consumes the bus until it reports end-of-stream.
    pub async fn run(&self, mut rx: BusReceiver) -> IndexStats {
        info!(geoip = self.enricher.is_some(), "Indexer started");

        let mut stats = IndexStats::default();
        while let Some(msg) = rx.recv().await {
            self.process(&msg, &mut stats).await;
        }

        info!(
            received = stats.received,
            indexed = stats.indexed,
            decode_errors = stats.decode_errors,
            enrich_errors = stats.enrich_errors,
            index_errors = stats.index_errors,
            "Indexer stopped"
        );
        stats
    }

    /// Handles one message.
    pub async fn process(&self, msg: &RawMessage, stats: &mut IndexStats) {
        stats.received += 1;

        let flow = match FlowMessage::decode(msg.payload.as_ref()) {
            Ok(flow) => flow,
            Err(e) => {
                stats.decode_errors += 1;
                metrics().decode_errors.inc();
                error!(
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "Failed to decode flow message"
                );
                return;
            }
        };
        metrics().records_decoded.inc();

        let mut record = self.transformer.transform(&flow);

        if let Some(enricher) = &self.enricher {
            if let Err(e) = enricher.enrich(&flow, &mut record) {
                stats.enrich_errors += 1;
                metrics().enrich_errors.inc();
                warn!(
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "GeoIP enrichment incomplete"
                );
            }
        }

        let started = Instant::now();
        let result = self.sink.index(&record).await;
        metrics()
            .index_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        match result {
            Ok(()) => {
                stats.indexed += 1;
                metrics().records_indexed.inc();
                debug!(partition = msg.partition, offset = msg.offset, "Flow indexed");
            }
            Err(e) => {
                stats.index_errors += 1;
                metrics().index_errors.inc();
                error!(
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "Failed to index flow"
                );
            }
        }
    }
}
