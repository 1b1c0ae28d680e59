//! Core types, flow record schema, and errors for the flow indexer.

pub mod error;
pub mod flow;
pub mod message;
pub mod sink;

pub use error::{Error, Result};
pub use flow::*;
pub use message::*;
pub use sink::RecordSink;
