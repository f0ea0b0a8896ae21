//! Error types for the broadcast engine

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Track error: {0}")]
    Track(#[from] TrackError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bitrate probing failures.
///
/// These never leave the prober: every variant is logged and replaced by the
/// configured fallback bitrate.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Probe wrote to stderr: {0}")]
    Stderr(String),

    #[error("Probe exited with {0}")]
    ExitStatus(std::process::ExitStatus),

    #[error("Unparsable bitrate output: {0:?}")]
    Parse(String),

    #[error("Probe timed out after {0}ms")]
    Timeout(u64),

    #[error("Failed to read probe output: {0}")]
    Io(#[from] std::io::Error),
}

/// Track selection and opening errors
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Failed to open track {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No track selected")]
    NoTrackSelected,
}

/// Per-listener delivery failures, recovered by dropping the listener
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Listener channel closed")]
    Closed,

    #[error("Listener buffer full ({capacity} chunks)")]
    Lagging { capacity: usize },
}

/// Failures that end an active broadcast session
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_error_converts_into_error() {
        let err: Error = TrackError::NoTrackSelected.into();
        assert!(matches!(err, Error::Track(TrackError::NoTrackSelected)));
        assert_eq!(err.to_string(), "Track error: No track selected");
    }

    #[test]
    fn test_open_error_mentions_path() {
        let err = TrackError::Open {
            path: PathBuf::from("songs/missing.mp3"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("songs/missing.mp3"));
    }
}
