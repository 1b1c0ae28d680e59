//! Elasticsearch sink for the flow indexer.

pub mod client;
pub mod config;
pub mod health;

pub use client::*;
pub use config::*;
