//! Streaming ingestion for the flow indexer.
//!
//! Core pipeline, upstream of the bus:
//! - [`PartitionWorker`]: one task per partition, pull → bus → checkpoint
//! - [`OffsetTracker`]: per-partition checkpoints with asynchronous commits
//! - [`ErrorMonitor`]: drains a worker's error feed into logs and metrics
//! - [`FanInBus`]: bounded many-writer, single-reader channel
//! - [`ShutdownCoordinator`]: stop signal plus the worker barrier
//! - [`IngestionPipeline`]: assembles the above for every partition
//!
//! Downstream of the bus the [`Indexer`] decodes, transforms, enriches and
//! persists each record.

pub mod bus;
pub mod enrichment;
pub mod indexer;
pub mod monitor;
pub mod offsets;
pub mod partition;
pub mod pipeline;
pub mod shutdown;
pub mod transform;

pub use bus::{BusReceiver, BusSender, FanInBus};
pub use enrichment::{AsnInfo, CityInfo, EnrichmentConfig, GeoEnricher, GeoLookup, MaxMindLookup};
pub use indexer::{IndexStats, Indexer};
pub use monitor::{error_feed, ErrorFeed, ErrorMonitor};
pub use offsets::{OffsetTracker, PartitionOffsets};
pub use partition::{FinishedWorker, PartitionWorker, WorkerExit, WorkerSummary};
pub use pipeline::{IngestionPipeline, PipelineConfig, ShutdownReport, StartPosition};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use transform::{ip_from_bytes, FlowTransformer, LookupTables};
