//! Flow Telemetry Indexer
//!
//! Streams goflow flow records from every partition of a Kafka topic into
//! Elasticsearch:
//! - one worker per partition with at-least-once checkpoints
//! - a bounded fan-in bus feeding a single indexer
//! - optional GeoIP and ASN enrichment from MaxMind databases
//! - graceful drain on SIGTERM / Ctrl+C

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tokio::time::interval;
use tracing::{error, info, warn};

use elastic::{ElasticConfig, ElasticSink};
use flow_core::RecordSink;
use ingest::{
    EnrichmentConfig, FlowTransformer, GeoEnricher, Indexer, IngestionPipeline, LookupTables,
    PipelineConfig, ShutdownSignal,
};
use kafka::{open_offset_store, KafkaConfig, KafkaSource, MessageSource};
use telemetry::{health, init_tracing_from_env, metrics};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    kafka: KafkaConfig,

    /// Bus and start position; topic and group come from `kafka`
    #[serde(default)]
    pipeline: PipelineConfig,

    #[serde(default)]
    elastic: ElasticConfig,

    #[serde(default)]
    enrichment: EnrichmentConfig,

    #[serde(default)]
    tables: LookupTables,

    /// How often the metrics snapshot is logged
    #[serde(default = "default_metrics_interval_secs")]
    metrics_interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kafka: KafkaConfig::default(),
            pipeline: PipelineConfig::default(),
            elastic: ElasticConfig::default(),
            enrichment: EnrichmentConfig::default(),
            tables: LookupTables::default(),
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

impl Config {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            topic: self.kafka.topic.clone(),
            group: self.kafka.group.clone(),
            ..self.pipeline.clone()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider BEFORE any TLS operations
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting flow indexer v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        brokers = %config.kafka.broker_string(),
        topic = %config.kafka.topic,
        group = %config.kafka.group,
        sasl_username = config.kafka.sasl_username.as_deref().unwrap_or("none"),
        "Loaded Kafka config"
    );

    let sink = Arc::new(
        ElasticSink::new(config.elastic.clone()).context("Failed to create Elasticsearch sink")?,
    );

    check_health(&config, &sink).await;

    let enricher =
        GeoEnricher::from_config(&config.enrichment).context("Failed to open GeoIP databases")?;

    let source: Arc<dyn MessageSource> = Arc::new(
        KafkaSource::connect(config.kafka.clone())
            .await
            .context("Failed to connect to Kafka")?,
    );

    let store = open_offset_store(&config.kafka.offsets)
        .await
        .context("Failed to open offset store")?;

    let (pipeline, rx) = IngestionPipeline::start(source, store, config.pipeline_config())
        .await
        .context("Failed to start ingestion pipeline")?;
    health().set_partitions_assigned(pipeline.assignment().len() as u64);

    let indexer = Indexer::new(FlowTransformer::new(config.tables.clone()), sink.clone())
        .with_enricher(enricher);
    let indexer_handle = tokio::spawn(async move { indexer.run(rx).await });

    let reporter = tokio::spawn(report_metrics(
        Duration::from_secs(config.metrics_interval_secs.max(1)),
        sink,
        pipeline.shutdown_signal(),
    ));

    shutdown_signal().await;
    info!("Shutting down...");

    let report = pipeline.shutdown().await;
    for worker in &report.workers {
        info!(
            partition = worker.partition,
            delivered = worker.delivered,
            exit = ?worker.exit,
            checkpoint = ?worker.checkpoint,
            committed = ?worker.committed,
            "Partition drained"
        );
    }

    match indexer_handle.await {
        Ok(stats) => info!(
            indexed = stats.indexed,
            index_errors = stats.index_errors,
            "Indexer drained"
        ),
        Err(e) => error!("Indexer task failed: {}", e),
    }

    if let Err(e) = reporter.await {
        warn!("Metrics reporter failed: {}", e);
    }
    metrics().snapshot().log();

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("FLOW")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(brokers) = std::env::var("FLOW_KAFKA_BROKERS") {
        config.kafka.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("FLOW_KAFKA_SASL_USERNAME") {
        config.kafka.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("FLOW_KAFKA_SASL_PASSWORD") {
        config.kafka.sasl_password = Some(password);
    }
    if let Ok(topic) = std::env::var("FLOW_KAFKA_TOPIC") {
        config.kafka.topic = topic;
    }
    if let Ok(group) = std::env::var("FLOW_KAFKA_GROUP") {
        config.kafka.group = group;
    }

    if let Ok(url) = std::env::var("FLOW_ELASTIC_URL") {
        config.elastic.url = url;
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(config: &Config, sink: &ElasticSink) {
    let kafka_healthy = kafka::health::check_connection(&config.kafka).await;
    if kafka_healthy {
        health().kafka.set_healthy();
        info!("Kafka connection: healthy");
    } else {
        health().kafka.set_unhealthy("Connection failed");
        error!("Kafka connection: unhealthy");
    }

    let elastic_healthy = elastic::health::check_connection(sink).await;
    if elastic_healthy {
        health().elastic.set_healthy();
        info!("Elasticsearch connection: healthy");
    } else {
        health().elastic.set_unhealthy("Connection failed");
        error!("Elasticsearch connection: unhealthy");
    }

    let report = health().report();
    info!(status = ?report.status, "Startup health");
}

/// Logs metrics and health every `period` until shutdown.
async fn report_metrics(period: Duration, sink: Arc<dyn RecordSink>, shutdown: ShutdownSignal) {
    let mut ticker = interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.fired() => break,
            _ = ticker.tick() => {
                if sink.is_healthy() {
                    health().elastic.set_healthy();
                } else {
                    health().elastic.set_unhealthy("Last index request failed");
                }
                metrics().snapshot().log();
                health().report().log();
            }
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
