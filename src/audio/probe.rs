//! Bitrate discovery through an external analysis tool
//!
//! The tool (by default `sox --i -B <file>`) prints the encoded bitrate of a
//! file, e.g. `128k`. Probing is best-effort: whatever goes wrong, the caller
//! gets the configured fallback and the broadcast goes on at that pace.

use serde::Serialize;
use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::constants::DEFAULT_FALLBACK_BITRATE;
use crate::error::ProbeError;
use crate::tracks::Track;

/// Encoded bitrate of a track, in bits per second. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Bitrate(NonZeroU32);

impl Bitrate {
    pub const DEFAULT: Bitrate = match NonZeroU32::new(DEFAULT_FALLBACK_BITRATE) {
        Some(bits) => Bitrate(bits),
        None => panic!("default bitrate must be non-zero"),
    };

    /// Returns `None` for zero
    pub fn new(bits_per_second: u32) -> Option<Self> {
        NonZeroU32::new(bits_per_second).map(Bitrate)
    }

    pub fn bits_per_second(self) -> u32 {
        self.0.get()
    }

    /// Byte rate used for pacing (at least 1)
    pub fn bytes_per_second(self) -> u64 {
        (u64::from(self.0.get()) / 8).max(1)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bit/s", self.0)
    }
}

/// Parse analysis tool output such as `128k`, `1.41M` or `96000`.
///
/// Only the first whitespace-separated token is considered.
pub fn parse_bitrate(output: &str) -> Result<Bitrate, ProbeError> {
    let parse_error = || ProbeError::Parse(output.trim().to_string());

    let token = output.split_whitespace().next().ok_or_else(parse_error)?;
    let (number, multiplier) = match token.chars().last() {
        Some('k') | Some('K') => (&token[..token.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&token[..token.len() - 1], 1_000_000.0),
        _ => (token, 1.0),
    };

    if !is_decimal_numeral(number) {
        return Err(parse_error());
    }
    let value: f64 = number.parse().map_err(|_| parse_error())?;
    if !value.is_finite() || value <= 0.0 {
        return Err(parse_error());
    }

    let bits = (value * multiplier).round();
    if bits < 1.0 || bits > f64::from(u32::MAX) {
        return Err(parse_error());
    }

    Bitrate::new(bits as u32).ok_or_else(parse_error)
}

/// Plain digits with at most one decimal point (no sign, exponent or `inf`)
fn is_decimal_numeral(s: &str) -> bool {
    let mut digits = 0;
    let mut dots = 0;
    for c in s.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

/// Runs the configured analysis tool against a track
#[derive(Debug, Clone)]
pub struct BitrateProber {
    program: String,
    args: Vec<String>,
    fallback: Bitrate,
    timeout: Duration,
}

impl BitrateProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            fallback: Bitrate::new(config.fallback_bitrate).unwrap_or(Bitrate::DEFAULT),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Bitrate returned when probing fails
    pub fn fallback(&self) -> Bitrate {
        self.fallback
    }

    /// Determine the track's bitrate, falling back instead of failing
    pub async fn probe(&self, track: &Track) -> Bitrate {
        match self.try_probe(track.path()).await {
            Ok(bitrate) => {
                info!(track = %track.path().display(), %bitrate, "Probed track bitrate");
                bitrate
            }
            Err(e) => {
                warn!(
                    track = %track.path().display(),
                    error = %e,
                    fallback = %self.fallback,
                    "Bitrate probe failed, using fallback"
                );
                self.fallback
            }
        }
    }

    async fn try_probe(&self, path: &Path) -> Result<Bitrate, ProbeError> {
        match tokio::time::timeout(self.timeout, self.run(path)).await {
            Ok(result) => result,
            // Dropping `run` kills the child (kill_on_drop)
            Err(_) => Err(ProbeError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    async fn run(&self, path: &Path) -> Result<Bitrate, ProbeError> {
        debug!(program = %self.program, args = ?self.args, path = %path.display(), "Spawning bitrate probe");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take().ok_or_else(missing_pipe)?;
        let mut stderr = child.stderr.take().ok_or_else(missing_pipe)?;

        // Both pipes are drained together so a chatty stderr cannot block stdout
        let mut out = Vec::new();
        let mut err = Vec::new();
        let (out_read, err_read) = tokio::join!(
            stdout.read_to_end(&mut out),
            stderr.read_to_end(&mut err)
        );
        out_read?;
        err_read?;

        let status = child.wait().await?;

        let err_text = String::from_utf8_lossy(&err);
        if !err_text.trim().is_empty() {
            return Err(ProbeError::Stderr(err_text.trim().to_string()));
        }
        if !status.success() {
            return Err(ProbeError::ExitStatus(status));
        }

        parse_bitrate(&String::from_utf8_lossy(&out))
    }
}

fn missing_pipe() -> ProbeError {
    ProbeError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "probe output not captured",
    ))
}
