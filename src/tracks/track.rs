//! Audio source description

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::File;

use crate::error::TrackError;

/// The file a broadcast session reads from.
///
/// Immutable once built; selecting another track means building a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    path: PathBuf,
    /// Lower-cased file extension, e.g. `mp3`
    format: Option<String>,
}

impl Track {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Open a fresh reader positioned at the start of the file
    pub async fn open(&self) -> Result<File, TrackError> {
        File::open(&self.path).await.map_err(|source| TrackError::Open {
            path: self.path.clone(),
            source,
        })
    }

    /// MIME type served to listeners
    pub fn content_type(&self) -> &'static str {
        match self.format() {
            Some("mp3") => "audio/mpeg",
            Some("ogg") | Some("oga") => "audio/ogg",
            Some("wav") => "audio/wav",
            Some("flac") => "audio/flac",
            Some("aac") => "audio/aac",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        let track = Track::new("songs/Conversation.MP3");
        assert_eq!(track.format(), Some("mp3"));
        assert_eq!(track.content_type(), "audio/mpeg");

        let track = Track::new("songs/no-extension");
        assert_eq!(track.format(), None);
        assert_eq!(track.content_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let track = Track::new("/definitely/not/here.mp3");
        let err = track.open().await.unwrap_err();
        assert!(matches!(err, TrackError::Open { .. }));
    }

    #[tokio::test]
    async fn test_open_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        assert!(Track::new(&path).open().await.is_ok());
    }
}
