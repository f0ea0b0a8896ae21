//! Audio source handling: bitrate discovery and real-time pacing

pub mod limiter;
pub mod probe;

pub use limiter::RateLimiter;
pub use probe::{parse_bitrate, Bitrate, BitrateProber};
