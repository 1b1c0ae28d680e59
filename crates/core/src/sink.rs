//! Downstream persistence seam.

use crate::{FlowRecord, Result};
use async_trait::async_trait;

/// Persists indexed flow documents.
///
/// Implemented by the Elasticsearch sink in production and by in-memory
/// collectors in tests.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn index(&self, record: &FlowRecord) -> Result<()>;

    fn is_healthy(&self) -> bool {
        true
    }
}
