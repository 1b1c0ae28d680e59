//! Messages and bookkeeping types shared between the source and the pipeline.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A record pulled from one partition of the topic.
///
/// The payload is opaque at this layer; decoding happens downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub payload: Bytes,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: payload.into(),
            timestamp: None,
        }
    }

    /// Offset to resume from once this message has been handed downstream.
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

/// Partitions of the topic owned by this process. Fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionAssignment {
    topic: String,
    partitions: BTreeSet<i32>,
}

impl PartitionAssignment {
    pub fn new(topic: impl Into<String>, partitions: impl IntoIterator<Item = i32>) -> Self {
        Self {
            topic: topic.into(),
            partitions: partitions.into_iter().collect(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Partition ids in ascending order.
    pub fn partitions(&self) -> impl Iterator<Item = i32> + '_ {
        self.partitions.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Next offset to resume consumption at for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCheckpoint {
    pub partition: i32,
    pub offset: i64,
}

/// An error observed by a partition worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerError {
    pub partition: i32,
    pub detail: String,
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

impl WorkerError {
    pub fn new(partition: i32, detail: impl Into<String>, fatal: bool) -> Self {
        Self {
            partition,
            detail: detail.into(),
            fatal,
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(partition: i32, err: &crate::Error) -> Self {
        Self::new(partition, err.to_string(), err.is_fatal())
    }
}
