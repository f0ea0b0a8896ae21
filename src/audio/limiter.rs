//! Real-time pacing of a byte source
//!
//! Releases data at the track's byte rate so that listeners receive it at
//! playback speed. The limiter is pull-based: the source is only read when the
//! consumer asks for the next chunk, which is how downstream back-pressure
//! reaches the file.

use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::audio::probe::Bitrate;

/// Leaky-bucket pacing transform over an async reader
pub struct RateLimiter<R> {
    reader: R,
    bytes_per_second: u64,
    chunk_size: usize,
    /// Earliest instant the next chunk may be released
    next_release: Option<Instant>,
    bytes_released: u64,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> RateLimiter<R> {
    /// Create a limiter releasing `bitrate / 8` bytes per second.
    ///
    /// Chunks never exceed one second of audio, so a single release cannot
    /// overshoot the rate by more than the configured chunk size.
    pub fn new(reader: R, bitrate: Bitrate, chunk_size: usize) -> Self {
        let bytes_per_second = bitrate.bytes_per_second();
        let chunk_size = chunk_size
            .min(usize::try_from(bytes_per_second).unwrap_or(usize::MAX))
            .max(1);

        Self {
            reader,
            bytes_per_second,
            chunk_size,
            next_release: None,
            bytes_released: 0,
            exhausted: false,
        }
    }

    /// Read, pace and return the next chunk; `None` once the source is exhausted
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }

        let chunk = self.fill_chunk().await?;
        if chunk.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        if let Some(at) = self.next_release {
            tokio::time::sleep_until(at).await;
        }

        // Credit is not banked across stalls: the schedule restarts from now
        let released_at = Instant::now();
        self.next_release = Some(released_at + self.budget_for(chunk.len()));
        self.bytes_released += chunk.len() as u64;

        Ok(Some(chunk))
    }

    /// Fill up to one chunk, tolerating short reads from the source
    async fn fill_chunk(&mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;

        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        buf.truncate(filled);
        Ok(buf.freeze())
    }

    fn budget_for(&self, len: usize) -> Duration {
        Duration::from_secs_f64(len as f64 / self.bytes_per_second as f64)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn bytes_released(&self) -> u64 {
        self.bytes_released
    }
}
