//! # vigil-config
//!
//! Configuration loading and validation for the Vigil alert console.
//!
//! Configuration lives in `~/.vigil/config.yaml` (or a path passed with
//! `--config`). A missing default file is not an error; every section has
//! working defaults so `vigil` runs against a local feed out of the box.
//!
//! ```yaml
//! feed:
//!   host: 127.0.0.1:8000
//!   secure: false
//! engine:
//!   throttle_window_ms: 2000
//!   visibility_window_ms: 2000
//!   max_visible: 5
//! reconnect:
//!   max_attempts: 10
//! sound:
//!   chime_on_critical: true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use vigil_core::{Result, VigilError};

/// Config file path (typically `~/.vigil/config.yaml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".vigil/config.yaml"))
}

/// Top-level Vigil configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct VigilConfig {
    /// Alert feed endpoint
    #[serde(default)]
    pub feed: FeedConfig,

    /// Engine windows and tier caps
    #[serde(default)]
    pub engine: EngineConfig,

    /// Reconnection backoff policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Audible chime behavior
    #[serde(default)]
    pub sound: SoundConfig,
}

impl VigilConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; the default path is allowed to be
    /// absent, in which case defaults apply. The loaded config is always
    /// validated before being returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(VigilError::ConfigNotFound {
                        path: path.to_path_buf(),
                    });
                }
                Self::load_from(path)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| VigilError::ConfigInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::parse(&content).map_err(|message| VigilError::ConfigInvalid {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration from a YAML string.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        serde_yaml::from_str::<VigilConfig>(content).map_err(|e| e.to_string())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(VigilError::ConfigValidation { message });

        if self.feed.host.trim().is_empty() {
            return fail("feed.host must not be empty".into());
        }
        if self.engine.throttle_window_ms == 0 {
            return fail("engine.throttle_window_ms must be > 0".into());
        }
        if self.engine.visibility_window_ms == 0 {
            return fail("engine.visibility_window_ms must be > 0".into());
        }
        if self.engine.critical_cap == 0 || self.engine.high_cap == 0 || self.engine.standard_cap == 0
        {
            return fail("engine tier caps must all be > 0".into());
        }
        if self.engine.max_visible == 0 {
            return fail("engine.max_visible must be > 0".into());
        }
        if self.reconnect.base_delay_ms == 0 {
            return fail("reconnect.base_delay_ms must be > 0".into());
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return fail(format!(
                "reconnect.max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
            ));
        }
        Ok(())
    }
}

/// Alert feed endpoint configuration.
///
/// The WebSocket and REST URLs are both derived from one host so a single
/// setting switches between local and remote deployments.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Host and port of the alert service, e.g. `127.0.0.1:8000`
    #[serde(default = "default_feed_host")]
    pub host: String,

    /// Use wss/https instead of ws/http
    #[serde(default)]
    pub secure: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: default_feed_host(),
            secure: false,
        }
    }
}

impl FeedConfig {
    /// WebSocket URL of the live alert stream.
    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}/api/alerts/ws", self.host)
    }

    /// Base URL of the alerts REST API (acknowledge/resolve).
    pub fn api_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}/api/alerts", self.host)
    }
}

fn default_feed_host() -> String {
    "127.0.0.1:8000".to_string()
}

/// Engine windows and notification tier caps.
///
/// `throttle_window_ms` and `visibility_window_ms` are independent knobs.
/// They default to the same 2000 ms because repeat suppression and toast
/// visibility are tuned together in practice, but nothing couples them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Sliding window within which a repeated signature refreshes the
    /// existing notification instead of creating a new one (ms)
    #[serde(default = "default_window_ms")]
    pub throttle_window_ms: u64,

    /// How long a non-critical notification stays visible (ms)
    #[serde(default = "default_window_ms")]
    pub visibility_window_ms: u64,

    /// Maximum simultaneously visible critical notifications
    #[serde(default = "default_critical_cap")]
    pub critical_cap: usize,

    /// Maximum simultaneously visible high notifications
    #[serde(default = "default_high_cap")]
    pub high_cap: usize,

    /// Maximum simultaneously visible medium+low notifications combined
    #[serde(default = "default_standard_cap")]
    pub standard_cap: usize,

    /// Overall cap across all tiers; critical entries are spared when
    /// trimming to this bound
    #[serde(default = "default_max_visible")]
    pub max_visible: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            throttle_window_ms: default_window_ms(),
            visibility_window_ms: default_window_ms(),
            critical_cap: default_critical_cap(),
            high_cap: default_high_cap(),
            standard_cap: default_standard_cap(),
            max_visible: default_max_visible(),
        }
    }
}

fn default_window_ms() -> u64 {
    2000
}

fn default_critical_cap() -> usize {
    3
}

fn default_high_cap() -> usize {
    5
}

fn default_standard_cap() -> usize {
    3
}

fn default_max_visible() -> usize {
    5
}

/// Reconnection backoff policy for the feed connection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    /// Base retry delay (ms); attempt `n` waits `base * 2^n`, capped
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the retry delay (ms)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempts before the connection is pinned closed and surfaced as
    /// "disconnected"
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    10
}

/// Audible chime behavior for newly admitted alerts.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SoundConfig {
    /// Chime when a critical alert is admitted
    #[serde(default = "default_true")]
    pub chime_on_critical: bool,

    /// Chime when a high alert is admitted
    #[serde(default)]
    pub chime_on_high: bool,

    /// Minimum interval between chimes (seconds)
    #[serde(default = "default_chime_cooldown")]
    pub chime_cooldown_secs: u64,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            chime_on_critical: true,
            chime_on_high: false,
            chime_cooldown_secs: default_chime_cooldown(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_chime_cooldown() -> u64 {
    30
}
