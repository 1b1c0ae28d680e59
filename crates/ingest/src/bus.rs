//! Fan-in bus between the partition workers and the indexer.
//!
//! A bounded tokio mpsc channel: every partition worker holds a
//! [`BusSender`], the indexer holds the only [`BusReceiver`]. A full bus
//! suspends writers, so a slow reader throttles all partitions.
//!
//! Ordering: the bus itself only keeps each sender's writes in order. Per
//! partition FIFO follows from handing out at most one sender per partition,
//! which [`FanInBus::writer`] enforces.
//!
//! The bus keeps one sender of its own. [`FanInBus::close`] drops it; once the
//! workers' senders are gone too, the receiver drains what is buffered and
//! then yields `None`.

use flow_core::{Error, RawMessage, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::debug;

struct BusState {
    sender: Option<mpsc::Sender<RawMessage>>,
    writers: HashSet<i32>,
}

/// Shared write side of the bus.
pub struct FanInBus {
    state: Mutex<BusState>,
    capacity: usize,
}

impl FanInBus {
    /// Creates the bus and its single read endpoint. A zero capacity is
    /// raised to one.
    pub fn new(capacity: usize) -> (Self, BusReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        let bus = Self {
            state: Mutex::new(BusState {
                sender: Some(tx),
                writers: HashSet::new(),
            }),
            capacity,
        };

        (bus, BusReceiver { inner: rx })
    }

    /// Registers the writer for `partition`.
    ///
    /// Fails if the partition already has a writer or the bus is closed.
    pub fn writer(&self, partition: i32) -> Result<BusSender> {
        let mut state = self.state.lock();

        let sender = state
            .sender
            .clone()
            .ok_or_else(|| Error::internal("fan-in bus is closed"))?;

        if !state.writers.insert(partition) {
            return Err(Error::internal(format!(
                "partition {} already has a bus writer",
                partition
            )));
        }

        Ok(BusSender {
            partition,
            inner: sender,
        })
    }

    /// Releases the bus's own sender. Returns `true` on the first call only.
    ///
    /// Must only be called once every worker has exited; the reader sees
    /// end-of-stream when the last writer is dropped.
    pub fn close(&self) -> bool {
        let closed = self.state.lock().sender.take().is_some();
        if closed {
            debug!("Fan-in bus closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().sender.is_none()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Write endpoint of one partition.
#[derive(Debug)]
pub struct BusSender {
    partition: i32,
    inner: mpsc::Sender<RawMessage>,
}

impl BusSender {
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Hands a message to the reader, waiting while the bus is full.
    ///
    /// Returns the message back if the reader has gone away.
    pub async fn send(&self, msg: RawMessage) -> std::result::Result<(), RawMessage> {
        debug_assert_eq!(msg.partition, self.partition);
        self.inner.send(msg).await.map_err(|e| e.0)
    }
}

/// The single read endpoint of the bus.
#[derive(Debug)]
pub struct BusReceiver {
    inner: mpsc::Receiver<RawMessage>,
}

impl BusReceiver {
    /// Next message, or `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<RawMessage> {
        self.inner.recv().await
    }

    /// Messages currently buffered.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
