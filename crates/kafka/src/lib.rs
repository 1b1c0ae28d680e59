//! Partitioned Kafka message source and offset stores for the flow indexer.
//!
//! The pipeline only talks to the [`MessageSource`], [`PartitionCursor`] and
//! [`OffsetStore`] traits; [`KafkaSource`] is the rskafka-backed
//! implementation used in production.

pub mod config;
pub mod consumer;
pub mod health;
pub mod offsets;
pub mod source;

pub use config::*;
pub use consumer::*;
pub use offsets::*;
pub use source::*;
