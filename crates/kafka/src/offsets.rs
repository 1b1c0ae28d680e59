//! Offset stores holding the consumer group's partition checkpoints.
//!
//! Keys are (group, topic, partition), so commits from different partition
//! workers never touch the same record.

use crate::config::{OffsetStoreConfig, OffsetStoreKind};
use async_trait::async_trait;
use flow_core::{Error, OffsetCheckpoint, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Durable record of where each partition should resume.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Stores `offset` as the next offset to consume for the partition.
    async fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) -> Result<()>;

    /// Returns the stored offset, if the partition was ever committed.
    async fn committed(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>>;
}

/// Opens the store selected by the configuration.
pub async fn open_offset_store(config: &OffsetStoreConfig) -> Result<Arc<dyn OffsetStore>> {
    match config.kind {
        OffsetStoreKind::File => Ok(Arc::new(FileOffsetStore::open(&config.dir).await?)),
        OffsetStoreKind::Memory => Ok(Arc::new(MemoryOffsetStore::new())),
    }
}

/// Stores each checkpoint as `<dir>/<group>/<topic>-<partition>.json`.
///
/// Files are replaced atomically via a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileOffsetStore {
    dir: PathBuf,
}

impl FileOffsetStore {
    /// Creates the base directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::offset_store(format!(
                "Failed to create offset directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        info!(dir = %dir.display(), "Opened file offset store");
        Ok(Self { dir })
    }

    fn path(&self, group: &str, topic: &str, partition: i32) -> PathBuf {
        self.dir
            .join(sanitize(group))
            .join(format!("{}-{}.json", sanitize(topic), partition))
    }
}

/// Keeps path components inside the store directory.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[async_trait]
impl OffsetStore for FileOffsetStore {
    async fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let path = self.path(group, topic, partition);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec(&OffsetCheckpoint { partition, offset })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(group, topic, partition, offset, "Checkpoint written");
        Ok(())
    }

    async fn committed(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>> {
        let path = self.path(group, topic, partition);
        match tokio::fs::read(&path).await {
            Ok(body) => {
                let checkpoint: OffsetCheckpoint = serde_json::from_slice(&body)?;
                Ok(Some(checkpoint.offset))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

type OffsetKey = (String, String, i32);

/// Process-local offset store.
#[derive(Debug, Default)]
pub struct MemoryOffsetStore {
    offsets: Mutex<HashMap<OffsetKey, i64>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read for callers outside the runtime.
    pub fn get(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.offsets
            .lock()
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) -> Result<()> {
        self.offsets
            .lock()
            .insert((group.to_string(), topic.to_string(), partition), offset);
        Ok(())
    }

    async fn committed(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>> {
        Ok(self.get(group, topic, partition))
    }
}
