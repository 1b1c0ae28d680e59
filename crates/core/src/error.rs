//! Unified error types for the flow indexer.
//!
//! Errors fall into four groups:
//! - startup: configuration, connection, partition discovery, offset store setup
//! - per partition: source errors, which are fatal when the cursor is gone
//! - downstream: decode, enrichment and sink failures, logged and skipped
//! - internal plumbing

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the flow indexer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("partition discovery failed for topic {topic}: {message}")]
    Discovery { topic: String, message: String },

    #[error("offset store error: {0}")]
    OffsetStore(String),

    /// Error reported by a partition cursor.
    #[error("partition {partition}: {message}")]
    Source {
        partition: i32,
        message: String,
        fatal: bool,
    },

    /// The partition cursor ended without a shutdown request.
    #[error("partition {0}: message source closed unexpectedly")]
    SourceClosed(i32),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("enrichment error: {0}")]
    Enrichment(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn discovery(topic: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Discovery {
            topic: topic.into(),
            message: msg.into(),
        }
    }

    pub fn offset_store(msg: impl Into<String>) -> Self {
        Self::OffsetStore(msg.into())
    }

    /// A recoverable error on one partition; the worker keeps pulling.
    pub fn source(partition: i32, msg: impl Into<String>) -> Self {
        Self::Source {
            partition,
            message: msg.into(),
            fatal: false,
        }
    }

    /// An error after which the partition cursor cannot make progress.
    pub fn source_fatal(partition: i32, msg: impl Into<String>) -> Self {
        Self::Source {
            partition,
            message: msg.into(),
            fatal: true,
        }
    }

    pub fn enrichment(msg: impl Into<String>) -> Self {
        Self::Enrichment(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a partition worker must stop after seeing this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Source { fatal, .. } => *fatal,
            Self::SourceClosed(_) => true,
            _ => false,
        }
    }

    /// Partition the error belongs to, if any.
    pub fn partition(&self) -> Option<i32> {
        match self {
            Self::Source { partition, .. } => Some(*partition),
            Self::SourceClosed(partition) => Some(*partition),
            _ => None,
        }
    }
}
