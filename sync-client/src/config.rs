//! Engine configuration.
//!
//! Configuration is loaded from a TOML file; every field has a default, so
//! an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_core::Theme;
use sync_types::PeerId;

/// Configuration for [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Peer to ask before any data item has named one (default: "companion").
    #[serde(default = "default_peer")]
    pub default_peer: String,
    /// Refresh interval until the companion overrides it (default: 30 minutes).
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Re-send an unanswered request after this long (default: never).
    ///
    /// Without it a request stays outstanding until the next record arrives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_retry_ms: Option<u64>,
    /// Tick cadence (default: 1 second).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Bound on one connection attempt (default: 30 seconds).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bound on the connect and fetch phases of an asset fetch (default: 100 seconds).
    #[serde(default = "default_asset_timeout_ms")]
    pub asset_timeout_ms: u64,
    /// Edge length of decoded icons in pixels (default: 70).
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
    /// Theme until the companion picks one (default: 3).
    #[serde(default = "default_theme")]
    pub default_theme: u8,
    /// Maximum queued asset fetches (default: 16).
    #[serde(default = "default_asset_queue_depth")]
    pub asset_queue_depth: usize,
}

// Default value functions
fn default_peer() -> String {
    "companion".to_string()
}

fn default_refresh_interval_ms() -> u64 {
    30 * 60 * 1000 // 30 minutes
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    30 * 1000
}

fn default_asset_timeout_ms() -> u64 {
    100 * 1000
}

fn default_thumbnail_size() -> u32 {
    70
}

fn default_theme() -> u8 {
    Theme::DEFAULT.value()
}

fn default_asset_queue_depth() -> usize {
    16
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_peer: default_peer(),
            refresh_interval_ms: default_refresh_interval_ms(),
            request_retry_ms: None,
            tick_interval_ms: default_tick_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            asset_timeout_ms: default_asset_timeout_ms(),
            thumbnail_size: default_thumbnail_size(),
            default_theme: default_theme(),
            asset_queue_depth: default_asset_queue_depth(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would stall or break the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("refresh_interval_ms", self.refresh_interval_ms == 0),
            ("tick_interval_ms", self.tick_interval_ms == 0),
            ("connect_timeout_ms", self.connect_timeout_ms == 0),
            ("asset_timeout_ms", self.asset_timeout_ms == 0),
            ("thumbnail_size", self.thumbnail_size == 0),
            ("asset_queue_depth", self.asset_queue_depth == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Invalid(format!("{field} must be non-zero")));
        }
        self.default_peer_id()?;
        Ok(())
    }

    /// The default peer as a validated identifier.
    pub fn default_peer_id(&self) -> Result<PeerId, ConfigError> {
        PeerId::new(self.default_peer.clone())
            .map_err(|e| ConfigError::Invalid(format!("default_peer: {e}")))
    }

    /// Set the default peer.
    pub fn with_default_peer(mut self, peer: &str) -> Self {
        self.default_peer = peer.to_string();
        self
    }

    /// Set the initial refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = millis(interval);
        self
    }

    /// Re-send unanswered requests after `retry`.
    pub fn with_request_retry(mut self, retry: Duration) -> Self {
        self.request_retry_ms = Some(millis(retry));
        self
    }

    /// Set the tick cadence.
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval_ms = millis(tick);
        self
    }

    /// Set the connection attempt bound.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis(timeout);
        self
    }

    /// Set the asset fetch bound.
    pub fn with_asset_timeout(mut self, timeout: Duration) -> Self {
        self.asset_timeout_ms = millis(timeout);
        self
    }

    /// Set the icon edge length.
    pub fn with_thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = size;
        self
    }

    /// Set the initial theme.
    pub fn with_default_theme(mut self, theme: u8) -> Self {
        self.default_theme = theme;
        self
    }

    /// Set the asset queue depth.
    pub fn with_asset_queue_depth(mut self, depth: usize) -> Self {
        self.asset_queue_depth = depth;
        self
    }

    /// Initial refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Delay before an unanswered request is re-sent, if enabled.
    pub fn request_retry(&self) -> Option<Duration> {
        self.request_retry_ms.map(Duration::from_millis)
    }

    /// Tick cadence.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Connection attempt bound.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Asset fetch bound.
    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    /// Initial theme.
    pub fn theme(&self) -> Theme {
        Theme::new(self.default_theme)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
