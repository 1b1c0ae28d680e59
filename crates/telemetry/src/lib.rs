//! Tracing, in-process metrics and component health for the flow indexer.
//!
//! Metrics are plain atomics read by the shutdown report and the periodic
//! log reporter; there is no external metrics backend.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
