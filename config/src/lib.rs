//! Configuration loading for Vow.
//!
//! Configuration lives in `~/.vow/config.toml` (or the file named by
//! `VOW_CONFIG`). Every section and key is optional:
//!
//! ```toml
//! [engine]
//! standard_window_minutes = 240
//!
//! [storage]
//! state_path = "~/.vow/state.json"
//!
//! [heartbeat]
//! interval_ms = 1000
//! ```
//!
//! [`VowConfig`] mirrors the file; [`VowConfig::resolve`] applies defaults and
//! validates values into a [`ResolvedConfig`].

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "VOW_CONFIG";

pub const DEFAULT_STANDARD_WINDOW_MINUTES: u32 = 240;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VowConfig {
    pub engine: Option<EngineConfig>,
    pub storage: Option<StorageConfig>,
    pub heartbeat: Option<HeartbeatConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Window granted to a new obligation before chronic-delay compression.
    pub standard_window_minutes: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Snapshot file. A leading `~/` expands to the home directory.
    pub state_path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    /// Cadence of `vow run` ticks.
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Validated configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub standard_window_minutes: u32,
    pub state_path: PathBuf,
    pub heartbeat_interval: Duration,
}

impl VowConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        Self::parse(&content, path).map(Some)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| {
            tracing::warn!("Failed to parse config at {}: {}", path.display(), err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let standard_window_minutes = self
            .engine
            .as_ref()
            .and_then(|engine| engine.standard_window_minutes)
            .unwrap_or(DEFAULT_STANDARD_WINDOW_MINUTES);
        if standard_window_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.standard_window_minutes",
                reason: "must be greater than zero".to_string(),
            });
        }

        let interval_ms = self
            .heartbeat
            .as_ref()
            .and_then(|heartbeat| heartbeat.interval_ms)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "heartbeat.interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        let state_path = match self
            .storage
            .as_ref()
            .and_then(|storage| storage.state_path.as_deref())
        {
            Some(raw) if raw.trim().is_empty() => {
                return Err(ConfigError::Invalid {
                    field: "storage.state_path",
                    reason: "must not be empty".to_string(),
                });
            }
            Some(raw) => expand_home(raw.trim()),
            None => default_state_path(),
        };

        Ok(ResolvedConfig {
            standard_window_minutes,
            state_path,
            heartbeat_interval: Duration::from_millis(interval_ms),
        })
    }
}

/// `~/.vow`, or `./.vow` when no home directory can be determined.
#[must_use]
pub fn vow_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".vow"), |home| home.join(".vow"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Some(expand_home(path.trim()));
    }
    dirs::home_dir().map(|home| home.join(".vow").join("config.toml"))
}

#[must_use]
pub fn default_state_path() -> PathBuf {
    vow_dir().join(STATE_FILE_NAME)
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}
