//! Shared helpers for the flow indexer integration tests.
//!
//! Everything runs in-process: the Kafka source and offset store are mocked,
//! and Elasticsearch is a local axum server where a test needs HTTP.

pub mod fixtures;
