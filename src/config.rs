//! Application configuration
//!
//! Loaded from a TOML file. Every section falls back to its defaults, so an
//! empty file (or no file at all) yields a runnable setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub broadcast: BroadcastConfig,
    pub probe: ProbeConfig,
    pub ui: UiConfig,
}

/// Broadcast pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Track streamed by `start` until another one is selected
    pub track: PathBuf,
    /// Upper bound for a single paced chunk, in bytes
    pub chunk_size: usize,
    /// Chunks a listener may have queued before it is dropped as lagging
    pub listener_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            track: PathBuf::from(DEFAULT_TRACK),
            chunk_size: DEFAULT_CHUNK_SIZE,
            listener_buffer: DEFAULT_LISTENER_BUFFER,
        }
    }
}

/// External bitrate analysis tool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// Executable name or path
    pub program: String,
    /// Arguments placed before the track path
    pub args: Vec<String>,
    /// Bitrate used whenever probing fails (bits per second)
    pub fallback_bitrate: u32,
    /// Upper bound on a single probe run
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: "sox".to_string(),
            args: vec!["--i".to_string(), "-B".to_string()],
            fallback_bitrate: DEFAULT_FALLBACK_BITRATE,
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Directory holding the static pages and assets
    pub public_dir: PathBuf,
    /// Home page, relative to `public_dir`
    pub home_page: PathBuf,
    /// Controller page, relative to `public_dir`
    pub controller_page: PathBuf,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            public_dir: PathBuf::from("public"),
            home_page: PathBuf::from("home/index.html"),
            controller_page: PathBuf::from("controller/index.html"),
        }
    }
}

impl AppConfig {
    /// Default config file location (`<config dir>/lan-radio/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "lan-radio", "lan-radio")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(default) if default.exists() => Self::load(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Write the config as TOML, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.broadcast.chunk_size == 0 {
            return Err(Error::Config("broadcast.chunk_size must be > 0".into()));
        }
        if self.broadcast.listener_buffer == 0 {
            return Err(Error::Config("broadcast.listener_buffer must be > 0".into()));
        }
        if self.probe.fallback_bitrate == 0 {
            return Err(Error::Config("probe.fallback_bitrate must be > 0".into()));
        }
        if self.probe.program.trim().is_empty() {
            return Err(Error::Config("probe.program must not be empty".into()));
        }
        if self.ui.http_port == 0 {
            return Err(Error::Config("ui.http_port must be > 0".into()));
        }
        Ok(())
    }

    /// Home page location on disk
    pub fn home_page_path(&self) -> PathBuf {
        self.ui.public_dir.join(&self.ui.home_page)
    }

    /// Controller page location on disk
    pub fn controller_page_path(&self) -> PathBuf {
        self.ui.public_dir.join(&self.ui.controller_page)
    }
}
