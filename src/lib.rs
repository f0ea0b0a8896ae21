//! # LAN Radio Broadcaster
//!
//! Plays one audio file at its own bitrate and fans the bytes out to every
//! connected listener, like a radio station: everyone hears the same thing at
//! the same time, and whoever tunes in late joins mid-song.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                     BroadcastController (broadcast::controller)          │
//! │        Idle ──▶ Starting ──▶ Streaming ──▶ Stopping ──▶ Idle             │
//! │                                                                          │
//! │   ┌──────────────┐   bitrate   ┌────────────────────┐                    │
//! │   │ BitrateProber│────────────▶│    RateLimiter     │                    │
//! │   │ (sox --i -B) │             │  bitrate / 8 B/s   │                    │
//! │   └──────────────┘             └─────────┬──────────┘                    │
//! │          ▲                               │ paced chunks                  │
//! │   ┌──────┴──────┐   file bytes           ▼                               │
//! │   │    Track    │──────────────▶ ┌────────────────────┐                  │
//! │   └─────────────┘                │   BroadcastSink    │                  │
//! │                                  └─────────┬──────────┘                  │
//! │                                            │ try_send, prune dead        │
//! │                                            ▼                             │
//! │   ┌──────────────────────────────────────────────────────────────────┐   │
//! │   │                ClientRegistry (broadcast::registry)              │   │
//! │   │   listener-1 ─▶ mpsc   listener-2 ─▶ mpsc   ...   listener-N     │   │
//! │   └──────────────────────────────────────────────────────────────────┘   │
//! └────────────────────────────────────────────┬─────────────────────────────┘
//!                                              │ ListenerStream
//!                                              ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │              Web UI (ui::server) - GET /stream, POST /controller         │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod tracks;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Bitrate used when the probe fails (bits per second)
    pub const DEFAULT_FALLBACK_BITRATE: u32 = 128_000;

    /// Upper bound of a single paced chunk in bytes
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;

    /// Chunks a listener may have queued before it is considered gone
    pub const DEFAULT_LISTENER_BUFFER: usize = 64;

    /// Probe time budget
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 3000;

    /// Track streamed when none is configured
    pub const DEFAULT_TRACK: &str = "audio/songs/current.mp3";
}
