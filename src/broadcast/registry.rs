//! Registry of attached listeners
//!
//! Each listener owns the receiving half of a bounded channel; the registry
//! keeps the sending half under an opaque id. Nothing outside this module can
//! reach into the map, so the only mutations are attach, detach and the
//! pruning done while delivering.

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::Stream;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::broadcast::session::SessionId;
use crate::error::ListenerError;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique listener identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// What a listener receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// Paced audio bytes, identical for every listener
    Chunk(Bytes),
    /// The session finished (stopped, exhausted or failed). The channel stays
    /// open and the next session's chunks follow on it.
    SessionEnded { session: SessionId },
}

/// Receiving end handed to whoever serves the listener
#[derive(Debug)]
pub struct ListenerStream {
    rx: mpsc::Receiver<ListenerEvent>,
}

impl ListenerStream {
    pub async fn recv(&mut self) -> Option<ListenerEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ListenerEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ListenerStream {
    type Item = ListenerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Registry-side half of a listener
#[derive(Debug)]
struct ListenerConnection {
    tx: mpsc::Sender<ListenerEvent>,
    capacity: usize,
}

impl ListenerConnection {
    /// Non-blocking write; a slow listener must never stall the broadcast
    fn offer(&self, event: ListenerEvent) -> Result<(), ListenerError> {
        if self.tx.is_closed() {
            return Err(ListenerError::Closed);
        }

        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Closed(_) => ListenerError::Closed,
            TrySendError::Full(_) => ListenerError::Lagging {
                capacity: self.capacity,
            },
        })
    }
}

/// Concurrent set of attached listeners
#[derive(Debug)]
pub struct ClientRegistry {
    listeners: DashMap<ListenerId, ListenerConnection>,
    buffer: usize,
}

impl ClientRegistry {
    /// `buffer` is the number of chunks a listener may have queued
    pub fn new(buffer: usize) -> Self {
        Self {
            listeners: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a new listener and return its id and stream
    pub fn attach(&self) -> (ListenerId, ListenerStream) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = ListenerId::next();

        self.listeners.insert(
            id,
            ListenerConnection {
                tx,
                capacity: self.buffer,
            },
        );
        debug!(listener = %id, listeners = self.listeners.len(), "Listener attached");

        (id, ListenerStream { rx })
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn detach(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            debug!(listener = %id, listeners = self.listeners.len(), "Listener detached");
        }
        removed
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Offer `event` to every listener, dropping those that fail.
    ///
    /// `on_drop` runs with a shard lock held and must not touch the registry.
    /// Returns the number of listeners that accepted the event.
    pub(crate) fn deliver<F>(&self, event: &ListenerEvent, mut on_drop: F) -> usize
    where
        F: FnMut(ListenerId, ListenerError),
    {
        let mut delivered = 0;
        self.listeners.retain(|id, connection| match connection.offer(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                on_drop(*id, e);
                false
            }
        });
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn chunk(data: &'static [u8]) -> ListenerEvent {
        ListenerEvent::Chunk(Bytes::from_static(data))
    }

    #[test]
    fn test_attach_assigns_unique_ids() {
        let registry = ClientRegistry::new(4);
        let (a, _sa) = registry.attach();
        let (b, _sb) = registry.attach();

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a) && registry.contains(b));
    }

    #[test]
    fn test_detach_is_idempotent() {
        let registry = ClientRegistry::new(4);
        let (id, _stream) = registry.attach();

        assert!(registry.detach(id));
        assert!(!registry.detach(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deliver_reaches_every_listener() {
        let registry = ClientRegistry::new(4);
        let (_, mut a) = registry.attach();
        let (_, mut b) = registry.attach();

        assert_eq!(registry.deliver(&chunk(b"abc"), |_, _| {}), 2);
        assert_eq!(a.try_recv(), Some(chunk(b"abc")));
        assert_eq!(b.try_recv(), Some(chunk(b"abc")));
    }

    #[test]
    fn test_deliver_prunes_closed_listener() {
        let registry = ClientRegistry::new(4);
        let (dead, dead_stream) = registry.attach();
        let (live, mut live_stream) = registry.attach();
        drop(dead_stream);

        let mut dropped = Vec::new();
        let delivered = registry.deliver(&chunk(b"x"), |id, e| dropped.push((id, e)));

        assert_eq!(delivered, 1);
        assert_eq!(dropped, vec![(dead, ListenerError::Closed)]);
        assert!(!registry.contains(dead));
        assert!(registry.contains(live));
        assert_eq!(live_stream.try_recv(), Some(chunk(b"x")));
    }

    #[test]
    fn test_deliver_drops_lagging_listener() {
        let registry = ClientRegistry::new(2);
        let (id, _stream) = registry.attach();

        registry.deliver(&chunk(b"1"), |_, _| {});
        registry.deliver(&chunk(b"2"), |_, _| {});

        let mut reason = None;
        registry.deliver(&chunk(b"3"), |_, e| reason = Some(e));

        assert_eq!(reason, Some(ListenerError::Lagging { capacity: 2 }));
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_attach_during_concurrent_delivery() {
        let registry = std::sync::Arc::new(ClientRegistry::new(1024));
        let (_, mut witness) = registry.attach();

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    registry.deliver(&chunk(b"tick"), |_, _| {});
                }
            })
        };

        let churn: Vec<_> = (0..200).map(|_| registry.attach()).collect();
        for (id, _) in &churn {
            registry.detach(*id);
        }
        writer.join().unwrap();

        let mut received = 0;
        while witness.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 500);
        assert_eq!(registry.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_ids_stay_unique(ops in proptest::collection::vec(any::<bool>(), 1..64)) {
            let registry = ClientRegistry::new(1);
            let mut seen = HashSet::new();
            let mut attached = Vec::new();

            for attach in ops {
                if attach || attached.is_empty() {
                    let (id, stream) = registry.attach();
                    prop_assert!(seen.insert(id));
                    attached.push((id, stream));
                } else {
                    let (id, _) = attached.remove(0);
                    prop_assert!(registry.detach(id));
                }
            }
            prop_assert_eq!(registry.len(), attached.len());
        }
    }
}
