//! One paced-read pipeline: track source -> rate limiter -> sink

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::audio::{Bitrate, RateLimiter};
use crate::broadcast::sink::BroadcastSink;
use crate::error::PipelineError;
use crate::tracks::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Metadata of an active broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastSession {
    pub id: SessionId,
    pub track: Track,
    pub bitrate: Bitrate,
    pub started_at: DateTime<Utc>,
}

impl BroadcastSession {
    pub fn new(track: Track, bitrate: Bitrate) -> Self {
        Self {
            id: SessionId::new(),
            track,
            bitrate,
            started_at: Utc::now(),
        }
    }
}

/// How a session's pipeline finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SessionOutcome {
    Stopped { bytes: u64 },
    Exhausted { bytes: u64 },
    Failed { bytes: u64, error: String },
}

impl SessionOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            SessionOutcome::Stopped { bytes }
            | SessionOutcome::Exhausted { bytes }
            | SessionOutcome::Failed { bytes, .. } => *bytes,
        }
    }
}

/// Live pipeline handle owned by the controller.
///
/// Dropping the handle also ends the pipeline: the stop channel closes.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    session: BroadcastSession,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Spawn the pump task for `session`
    pub(crate) fn spawn<R, F>(
        session: BroadcastSession,
        limiter: RateLimiter<R>,
        sink: Arc<BroadcastSink>,
        on_finish: F,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        F: FnOnce(&SessionOutcome) + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let id = session.id;
        let task = tokio::spawn(async move {
            let outcome = pump(id, limiter, &sink, stop_rx).await;
            sink.end_session(id);
            on_finish(&outcome);
            outcome
        });

        Self {
            session,
            stop_tx: Some(stop_tx),
            task,
        }
    }

    pub(crate) fn session(&self) -> &BroadcastSession {
        &self.session
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the pump to stop and wait until the pipeline has completed
    pub(crate) async fn stop(mut self) -> SessionOutcome {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Err means the pump already finished on its own
            let _ = stop_tx.send(());
        }
        self.join().await
    }

    /// Wait for the pump without signalling it
    pub(crate) async fn join(self) -> SessionOutcome {
        let id = self.session.id;
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session = %id, error = %e, "Broadcast pump task aborted");
                SessionOutcome::Failed {
                    bytes: 0,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Move paced chunks from the limiter into the sink until stopped or drained.
///
/// A chunk still being paced when stop arrives is discarded; every chunk
/// already released has been written to all listeners.
async fn pump<R>(
    session: SessionId,
    mut limiter: RateLimiter<R>,
    sink: &BroadcastSink,
    mut stop_rx: oneshot::Receiver<()>,
) -> SessionOutcome
where
    R: AsyncRead + Unpin,
{
    info!(
        %session,
        bytes_per_second = limiter.bytes_per_second(),
        chunk_size = limiter.chunk_size(),
        "Broadcast pipeline started"
    );

    let mut chunks = 0u64;
    let outcome = loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                break SessionOutcome::Stopped { bytes: limiter.bytes_released() };
            }
            next = limiter.next_chunk() => match next {
                Ok(Some(chunk)) => {
                    let listeners = sink.broadcast(chunk);
                    chunks += 1;
                    if chunks % 100 == 0 {
                        debug!(%session, chunks, listeners, bytes = limiter.bytes_released(), "Broadcast progress");
                    }
                }
                Ok(None) => {
                    break SessionOutcome::Exhausted { bytes: limiter.bytes_released() };
                }
                Err(e) => {
                    let e = PipelineError::from(e);
                    error!(%session, error = %e, "Broadcast pipeline failed");
                    break SessionOutcome::Failed {
                        bytes: limiter.bytes_released(),
                        error: e.to_string(),
                    };
                }
            },
        }
    };

    info!(%session, chunks, ?outcome, "Broadcast pipeline finished");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::registry::{ClientRegistry, ListenerEvent};
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    fn setup() -> (Arc<ClientRegistry>, Arc<BroadcastSink>) {
        let registry = Arc::new(ClientRegistry::new(1024));
        let sink = Arc::new(BroadcastSink::new(registry.clone()));
        (registry, sink)
    }

    fn session() -> BroadcastSession {
        BroadcastSession::new(Track::new("test.mp3"), Bitrate::new(800_000).unwrap())
    }

    /// Yields `good` bytes, then fails
    struct FailingReader {
        good: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.good == 0 {
                return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "disk went away")));
            }
            let n = self.good.min(buf.remaining());
            buf.put_slice(&vec![7u8; n]);
            self.good -= n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_source_ends_session() {
        let (registry, sink) = setup();
        let (_, mut listener) = registry.attach();
        let session = session();
        let id = session.id;

        let limiter = RateLimiter::new(Cursor::new(vec![1u8; 250]), session.bitrate, 100);
        let handle = SessionHandle::spawn(session, limiter, sink, |_| {});

        assert_eq!(handle.join().await, SessionOutcome::Exhausted { bytes: 250 });

        let mut sizes = Vec::new();
        while let Some(event) = listener.try_recv() {
            match event {
                ListenerEvent::Chunk(bytes) => sizes.push(bytes.len()),
                ListenerEvent::SessionEnded { session } => {
                    assert_eq!(session, id);
                    break;
                }
            }
        }
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_session_and_notifies() {
        let (registry, sink) = setup();
        let (_, mut listener) = registry.attach();
        let session = session();

        // 100 kB/s over 10 MB: would take far longer than this test
        let limiter = RateLimiter::new(Cursor::new(vec![0u8; 10_000_000]), session.bitrate, 1000);
        let handle = SessionHandle::spawn(session, limiter, sink, |_| {});

        assert!(matches!(listener.recv().await, Some(ListenerEvent::Chunk(_))));
        let outcome = handle.stop().await;
        assert!(matches!(outcome, SessionOutcome::Stopped { bytes } if bytes >= 1000));

        let mut last = None;
        while let Some(event) = listener.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(ListenerEvent::SessionEnded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_fails_session() {
        let (_registry, sink) = setup();
        let session = session();
        let limiter = RateLimiter::new(FailingReader { good: 300 }, session.bitrate, 100);

        let (seen_tx, seen_rx) = oneshot::channel();
        let handle = SessionHandle::spawn(session, limiter, sink, move |outcome| {
            let _ = seen_tx.send(outcome.clone());
        });

        let outcome = handle.join().await;
        assert!(matches!(outcome, SessionOutcome::Failed { bytes: 300, .. }));
        assert_eq!(seen_rx.await.unwrap(), outcome);
    }
}
