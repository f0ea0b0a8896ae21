//! Broadcast lifecycle
//!
//! ```text
//!            start                       pipeline wired
//!   Idle ───────────────▶ Starting ──────────────────────▶ Streaming
//!    ▲                       │ track open failed              │  │
//!    └───────────────────────┘                                │  │ source exhausted
//!    ▲                                                        │  │ or pipeline failure
//!    │          limiter ended            stop                 │  │
//!    └────────────────────── Stopping ◀───────────────────────┘  │
//!    └───────────────────────────────────────────────────────────┘
//! ```
//!
//! `start` while streaming tears the running session down first, so there is
//! never more than one pipeline. Listener attach/detach works in every state
//! and never changes it.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::audio::{BitrateProber, RateLimiter};
use crate::broadcast::registry::{ClientRegistry, ListenerId, ListenerStream};
use crate::broadcast::session::{BroadcastSession, SessionHandle, SessionId, SessionOutcome};
use crate::broadcast::sink::{BroadcastSink, SinkStats};
use crate::config::AppConfig;
use crate::error::{Result, TrackError};
use crate::tracks::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

/// Snapshot published on every state transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub state: BroadcastState,
    pub session: Option<BroadcastSession>,
}

impl ControllerStatus {
    fn idle() -> Self {
        Self {
            state: BroadcastState::Idle,
            session: None,
        }
    }
}

/// Owns the single broadcast session and the listener registry
pub struct BroadcastController {
    registry: Arc<ClientRegistry>,
    sink: Arc<BroadcastSink>,
    prober: BitrateProber,
    chunk_size: usize,
    selected: RwLock<Option<Track>>,
    /// Serialises start/stop/select; holds the running pipeline
    active: Mutex<Option<SessionHandle>>,
    status: Arc<watch::Sender<ControllerStatus>>,
}

impl BroadcastController {
    pub fn new(config: &AppConfig) -> Self {
        let registry = Arc::new(ClientRegistry::new(config.broadcast.listener_buffer));
        let sink = Arc::new(BroadcastSink::new(registry.clone()));
        let (status, _) = watch::channel(ControllerStatus::idle());

        Self {
            registry,
            sink,
            prober: BitrateProber::new(&config.probe),
            chunk_size: config.broadcast.chunk_size,
            selected: RwLock::new(Some(Track::new(&config.broadcast.track))),
            active: Mutex::new(None),
            status: Arc::new(status),
        }
    }

    /// Start broadcasting the selected track, restarting if already streaming
    pub async fn start_broadcast(&self) -> Result<BroadcastSession> {
        let mut active = self.active.lock().await;
        self.start_locked(&mut active).await
    }

    /// Stop the running session and wait for its pipeline to complete.
    ///
    /// Returns `None` when nothing was streaming.
    pub async fn stop_broadcast(&self) -> Option<SessionOutcome> {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(handle) => self.shutdown(handle).await,
            None => {
                debug!("Stop requested while idle");
                // No pipeline exists, so nothing but Idle may be reported
                self.status.send_if_modified(|current| {
                    if current.state == BroadcastState::Idle {
                        false
                    } else {
                        *current = ControllerStatus::idle();
                        true
                    }
                });
                None
            }
        }
    }

    /// Select the track for the next session; restarts a running broadcast on it
    pub async fn select_track(&self, track: Track) -> Result<Option<BroadcastSession>> {
        let mut active = self.active.lock().await;
        info!(track = %track.path().display(), "Track selected");
        *self.selected.write() = Some(track);

        let streaming = active.as_ref().is_some_and(|handle| !handle.is_finished());
        if streaming {
            self.start_locked(&mut active).await.map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn attach_listener(&self) -> (ListenerId, ListenerStream) {
        self.registry.attach()
    }

    pub fn detach_listener(&self, id: ListenerId) -> bool {
        self.registry.detach(id)
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> BroadcastState {
        self.status.borrow().state
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status.subscribe()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.selected.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn sink_stats(&self) -> SinkStats {
        self.sink.stats()
    }

    async fn start_locked(&self, active: &mut Option<SessionHandle>) -> Result<BroadcastSession> {
        // Covers the caller being dropped while the old session is torn
        // down or while the new track is probed
        let transition = IdleOnDrop::new(&self.status);

        if let Some(handle) = active.take() {
            info!(session = %handle.session().id, "Restarting broadcast");
            self.shutdown(handle).await;
        }

        self.publish(BroadcastState::Starting, None);

        match self.launch().await {
            Ok(handle) => {
                let session = handle.session().clone();
                *active = Some(handle);
                transition.complete();
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Broadcast failed to start");
                Err(e)
            }
        }
    }

    /// Open, probe, pace and spawn. Publishes `Streaming` before the pump runs
    /// so a very short track cannot finish ahead of the transition.
    async fn launch(&self) -> Result<SessionHandle> {
        let track = self
            .selected
            .read()
            .clone()
            .ok_or(TrackError::NoTrackSelected)?;

        let reader = track.open().await?;
        let bitrate = self.prober.probe(&track).await;
        let limiter = RateLimiter::new(reader, bitrate, self.chunk_size);

        let session = BroadcastSession::new(track, bitrate);
        info!(
            session = %session.id,
            track = %session.track.path().display(),
            %bitrate,
            listeners = self.registry.len(),
            "Broadcast started"
        );
        self.publish(BroadcastState::Streaming, Some(session.clone()));

        let on_finish = idle_when_finished(self.status.clone(), session.id);
        let handle = SessionHandle::spawn(session, limiter, self.sink.clone(), on_finish);

        Ok(handle)
    }

    async fn shutdown(&self, handle: SessionHandle) -> Option<SessionOutcome> {
        if handle.is_finished() {
            let outcome = handle.join().await;
            debug!(?outcome, "Reaped finished session");
            return None;
        }

        let session = handle.session().clone();
        let transition = IdleOnDrop::new(&self.status);
        self.publish(BroadcastState::Stopping, Some(session.clone()));

        // The stop signal is sent on first poll, so a dropped caller still
        // ends the pipeline; `transition` then restores Idle
        let outcome = handle.stop().await;
        info!(session = %session.id, bytes = outcome.bytes(), "Broadcast stopped");

        drop(transition);
        Some(outcome)
    }

    fn publish(&self, state: BroadcastState, session: Option<BroadcastSession>) {
        self.status.send_replace(ControllerStatus { state, session });
    }
}

/// Publishes `Idle` when dropped unless the transition completed
struct IdleOnDrop<'a> {
    status: &'a watch::Sender<ControllerStatus>,
    armed: bool,
}

impl<'a> IdleOnDrop<'a> {
    fn new(status: &'a watch::Sender<ControllerStatus>) -> Self {
        Self {
            status,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.status.send_replace(ControllerStatus::idle());
        }
    }
}

/// Session end callback: only a pipeline that ended by itself moves the state
/// here. Stop and restart publish their own transitions.
fn idle_when_finished(
    status: Arc<watch::Sender<ControllerStatus>>,
    id: SessionId,
) -> impl FnOnce(&SessionOutcome) + Send + 'static {
    move |outcome| {
        status.send_if_modified(|current| {
            let ours = current.session.as_ref().is_some_and(|s| s.id == id);
            if ours && current.state == BroadcastState::Streaming {
                match outcome {
                    SessionOutcome::Failed { error, .. } => {
                        warn!(session = %id, %error, "Session ended by pipeline failure")
                    }
                    _ => debug!(session = %id, ?outcome, "Session ended on its own"),
                }
                *current = ControllerStatus::idle();
                true
            } else {
                false
            }
        });
    }
}
