use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SoundbaseConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `info` or `soundbase=debug`.
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StatsConfig {
    /// Trailing window for reports. `0` means all history.
    pub default_days: u32,
    pub leaderboard_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_soundbase_dir()
            .join("soundbase.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 5 }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            default_days: 7,
            leaderboard_size: 10,
        }
    }
}

/// Returns `~/.soundbase/`, or `./.soundbase/` when no home directory is known.
pub fn default_soundbase_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".soundbase")
}

/// Returns the default config file path: `~/.soundbase/config.toml`
pub fn default_config_path() -> PathBuf {
    default_soundbase_dir().join("config.toml")
}

impl SoundbaseConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SoundbaseConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (SOUNDBASE_DB, SOUNDBASE_LOG_LEVEL, SOUNDBASE_BUSY_TIMEOUT_MS).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SOUNDBASE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SOUNDBASE_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Ok(val) = std::env::var("SOUNDBASE_BUSY_TIMEOUT_MS") {
            match val.parse() {
                Ok(ms) => self.storage.busy_timeout_ms = ms,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid SOUNDBASE_BUSY_TIMEOUT_MS"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
