//! Listener response bodies

use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use std::sync::Arc;

use crate::broadcast::{BroadcastController, ListenerEvent, ListenerId, ListenerStream};

/// Detaches its listener when the response body is dropped (client gone)
pub struct ListenerGuard {
    controller: Arc<BroadcastController>,
    id: ListenerId,
}

impl ListenerGuard {
    pub fn new(controller: Arc<BroadcastController>, id: ListenerId) -> Self {
        Self { controller, id }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        // May already be pruned by the sink
        self.controller.detach_listener(self.id);
        tracing::info!(listener = %self.id, "Listener left");
    }
}

/// Audio bytes for one listener. Session boundaries are not visible on the
/// wire: the body simply goes quiet until the next session starts.
pub fn listener_body(
    listener: ListenerStream,
    guard: ListenerGuard,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    stream::unfold((listener, guard), |(mut listener, guard)| async move {
        loop {
            match listener.next().await? {
                ListenerEvent::Chunk(bytes) => return Some((Ok(bytes), (listener, guard))),
                ListenerEvent::SessionEnded { session } => {
                    tracing::debug!(listener = %guard.id(), %session, "Session ended, waiting for next");
                }
            }
        }
    })
}
