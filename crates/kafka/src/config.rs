//! Kafka source configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SASL mechanism used when credentials are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaslMechanism {
    #[default]
    Plain,
    ScramSha256,
    ScramSha512,
}

/// Where partition checkpoints are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetStoreKind {
    /// One JSON file per (group, topic, partition)
    #[default]
    File,
    /// Process-local; checkpoints are lost on restart
    Memory,
}

/// Offset store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetStoreConfig {
    #[serde(default)]
    pub kind: OffsetStoreKind,
    #[serde(default = "default_offsets_dir")]
    pub dir: PathBuf,
}

fn default_offsets_dir() -> PathBuf {
    PathBuf::from("data/offsets")
}

impl Default for OffsetStoreConfig {
    fn default() -> Self {
        Self {
            kind: OffsetStoreKind::default(),
            dir: default_offsets_dir(),
        }
    }
}

/// Kafka consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// Topic carrying flow messages
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group the checkpoints are stored under
    #[serde(default = "default_group")]
    pub group: String,
    /// SASL username (enables SASL together with the password)
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    #[serde(default)]
    pub sasl_mechanism: SaslMechanism,
    /// Use TLS even without SASL credentials
    #[serde(default)]
    pub tls: bool,
    /// Upper bound of bytes returned by one fetch
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,
    /// How long the broker may hold a fetch open waiting for data
    #[serde(default = "default_fetch_max_wait_ms")]
    pub fetch_max_wait_ms: i32,
    /// Pause after a failed fetch before the cursor tries again
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default)]
    pub offsets: OffsetStoreConfig,
}

fn default_topic() -> String {
    "flows".to_string()
}

fn default_group() -> String {
    "flow-indexer".to_string()
}

fn default_fetch_max_bytes() -> i32 {
    1024 * 1024
}

fn default_fetch_max_wait_ms() -> i32 {
    500
}

fn default_error_backoff_ms() -> u64 {
    1000
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: default_topic(),
            group: default_group(),
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: SaslMechanism::default(),
            tls: false,
            fetch_max_bytes: default_fetch_max_bytes(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            offsets: OffsetStoreConfig::default(),
        }
    }
}

impl KafkaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// SASL credentials, when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    /// SASL always travels over TLS.
    pub fn use_tls(&self) -> bool {
        self.tls || self.credentials().is_some()
    }
}
