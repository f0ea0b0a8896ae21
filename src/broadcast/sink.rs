//! Fan-out of paced chunks to every attached listener

use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::broadcast::registry::{ClientRegistry, ListenerEvent};
use crate::broadcast::session::SessionId;
use crate::error::ListenerError;

/// Writes each chunk to all registered listeners.
///
/// Writes never wait: a listener that is gone or no longer draining its
/// channel is removed from the registry and the others carry on.
#[derive(Debug)]
pub struct BroadcastSink {
    registry: Arc<ClientRegistry>,
    chunks_written: AtomicU64,
    bytes_written: AtomicU64,
    listeners_pruned: AtomicU64,
}

impl BroadcastSink {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            chunks_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            listeners_pruned: AtomicU64::new(0),
        }
    }

    /// Offer `chunk` to every listener; returns how many accepted it
    pub fn broadcast(&self, chunk: Bytes) -> usize {
        let len = chunk.len() as u64;
        let delivered = self.deliver(ListenerEvent::Chunk(chunk));

        self.chunks_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(len, Ordering::Relaxed);
        delivered
    }

    /// Tell every listener that `session` is over
    pub fn end_session(&self, session: SessionId) -> usize {
        self.deliver(ListenerEvent::SessionEnded { session })
    }

    fn deliver(&self, event: ListenerEvent) -> usize {
        let pruned = &self.listeners_pruned;
        self.registry.deliver(&event, |id, error| {
            pruned.fetch_add(1, Ordering::Relaxed);
            match error {
                ListenerError::Closed => debug!(listener = %id, "Pruned closed listener"),
                ListenerError::Lagging { capacity } => {
                    warn!(listener = %id, capacity, "Dropping listener that stopped draining")
                }
            }
        })
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            listeners_pruned: self.listeners_pruned.load(Ordering::Relaxed),
            listeners: self.registry.len(),
        }
    }
}

/// Sink counters since process start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub chunks_written: u64,
    pub bytes_written: u64,
    pub listeners_pruned: u64,
    pub listeners: usize,
}
