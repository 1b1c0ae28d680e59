//! rskafka-backed message source.
//!
//! One [`KafkaSource`] owns the broker client used for partition discovery;
//! every partition gets its own [`KafkaCursor`] holding a dedicated
//! partition client, so workers never contend on a shared connection.

use crate::config::{KafkaConfig, SaslMechanism};
use crate::source::{MessageSource, PartitionCursor, StartOffset};
use async_trait::async_trait;
use bytes::Bytes;
use flow_core::{Error, RawMessage, Result};
use parking_lot::RwLock;
use rskafka::client::error::{Error as RsKafkaError, ProtocolError};
use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use rskafka::record::RecordAndOffset;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Creates a TLS configuration trusting the webpki roots.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Client builder with TLS and SASL applied from the config.
pub(crate) fn client_builder(config: &KafkaConfig) -> ClientBuilder {
    let mut builder = ClientBuilder::new(config.brokers.clone());

    if config.use_tls() {
        builder = builder.tls_config(create_tls_config());
    }

    if let Some((username, password)) = config.credentials() {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        let sasl = match config.sasl_mechanism {
            SaslMechanism::Plain => SaslConfig::Plain(credentials),
            SaslMechanism::ScramSha256 => SaslConfig::ScramSha256(credentials),
            SaslMechanism::ScramSha512 => SaslConfig::ScramSha512(credentials),
        };
        builder = builder.sasl_config(sasl);
    }

    builder
}

/// Message source reading a topic from Kafka-compatible brokers.
pub struct KafkaSource {
    config: KafkaConfig,
    /// `None` once the source has been closed
    client: RwLock<Option<Arc<Client>>>,
}

impl KafkaSource {
    /// Connects to the brokers. Failure here is fatal at startup.
    pub async fn connect(config: KafkaConfig) -> Result<Self> {
        info!(
            brokers = %config.broker_string(),
            topic = %config.topic,
            group = %config.group,
            tls = config.use_tls(),
            "Connecting Kafka source"
        );

        let client = client_builder(&config)
            .build()
            .await
            .map_err(|e| Error::connection(format!("Failed to connect to Kafka: {}", e)))?;

        Ok(Self {
            config,
            client: RwLock::new(Some(Arc::new(client))),
        })
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    fn client(&self) -> Result<Arc<Client>> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| Error::connection("Kafka source has been closed"))
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        let topics = self
            .client()?
            .list_topics()
            .await
            .map_err(|e| Error::discovery(topic, e.to_string()))?;

        let found = topics
            .into_iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| Error::discovery(topic, "topic does not exist"))?;

        let partitions: Vec<i32> = found.partitions.into_iter().collect();
        debug!(topic = %topic, partitions = ?partitions, "Discovered partitions");
        Ok(partitions)
    }

    async fn open(
        &self,
        topic: &str,
        partition: i32,
        start: StartOffset,
    ) -> Result<Box<dyn PartitionCursor>> {
        let client = self
            .client()?
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
            .await
            .map_err(|e| {
                Error::connection(format!(
                    "Failed to get partition client for {}/{}: {}",
                    topic, partition, e
                ))
            })?;

        let offset = match start {
            StartOffset::At(offset) => offset,
            StartOffset::Newest => client.get_offset(OffsetAt::Latest).await.map_err(|e| {
                Error::connection(format!(
                    "Failed to get newest offset for {}/{}: {}",
                    topic, partition, e
                ))
            })?,
        };

        info!(topic = %topic, partition, offset, "Opened partition cursor");

        Ok(Box::new(KafkaCursor {
            topic: topic.to_string(),
            partition,
            client: Arc::new(client),
            offset,
            buffered: VecDeque::new(),
            max_bytes: self.config.fetch_max_bytes,
            max_wait_ms: self.config.fetch_max_wait_ms,
            error_backoff: Duration::from_millis(self.config.error_backoff_ms),
            backoff_pending: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.client.write().take().is_some() {
            info!(topic = %self.config.topic, "Kafka source closed");
        }
        Ok(())
    }
}

/// Byte bounds of one fetch request. Never empty, whatever the configured
/// maximum.
fn fetch_bytes(max_bytes: i32) -> Range<i32> {
    1..max_bytes.max(2)
}

/// Cursor over one partition, fetching record batches and yielding them
/// one at a time.
pub struct KafkaCursor {
    topic: String,
    partition: i32,
    client: Arc<PartitionClient>,
    /// Next offset to yield
    offset: i64,
    buffered: VecDeque<RecordAndOffset>,
    max_bytes: i32,
    max_wait_ms: i32,
    error_backoff: Duration,
    backoff_pending: bool,
}

impl KafkaCursor {
    fn to_message(&self, record: RecordAndOffset) -> Option<RawMessage> {
        // Tombstones carry no flow data.
        let value = record.record.value?;
        Some(RawMessage {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: record.offset,
            key: record.record.key.map(Bytes::from),
            payload: Bytes::from(value),
            timestamp: Some(record.record.timestamp),
        })
    }

    async fn fetch(&mut self) -> Result<()> {
        if self.backoff_pending {
            tokio::time::sleep(self.error_backoff).await;
            self.backoff_pending = false;
        }

        match self
            .client
            .fetch_records(self.offset, fetch_bytes(self.max_bytes), self.max_wait_ms)
            .await
        {
            Ok((records, _high_watermark)) => {
                // Compressed batches may start before the requested offset.
                let from = self.offset;
                self.buffered
                    .extend(records.into_iter().filter(|r| r.offset >= from));
                Ok(())
            }
            Err(e) => Err(self.classify(e).await),
        }
    }

    async fn classify(&mut self, e: RsKafkaError) -> Error {
        let protocol_error = match &e {
            RsKafkaError::ServerError { protocol_error, .. } => Some(protocol_error.clone()),
            _ => None,
        };

        match protocol_error {
            Some(ProtocolError::OffsetOutOfRange) => {
                match self.client.get_offset(OffsetAt::Latest).await {
                    Ok(newest) => {
                        warn!(
                            partition = self.partition,
                            old_offset = self.offset,
                            new_offset = newest,
                            "Offset out of range; skipping to newest"
                        );
                        self.offset = newest;
                        Error::source(
                            self.partition,
                            format!("offset out of range, resumed at newest offset {}", newest),
                        )
                    }
                    Err(reset_err) => {
                        self.backoff_pending = true;
                        Error::source(
                            self.partition,
                            format!("offset out of range and reset failed: {}", reset_err),
                        )
                    }
                }
            }
            Some(ProtocolError::UnknownTopicOrPartition) => {
                Error::source_fatal(self.partition, e.to_string())
            }
            _ => {
                self.backoff_pending = true;
                Error::source(self.partition, format!("fetch failed: {}", e))
            }
        }
    }
}

#[async_trait]
impl PartitionCursor for KafkaCursor {
    fn partition(&self) -> i32 {
        self.partition
    }

    fn position(&self) -> i64 {
        self.offset
    }

    async fn next(&mut self) -> Result<Option<RawMessage>> {
        loop {
            while let Some(record) = self.buffered.pop_front() {
                self.offset = record.offset + 1;
                if let Some(msg) = self.to_message(record) {
                    return Ok(Some(msg));
                }
            }

            self.fetch().await?;
        }
    }
}
