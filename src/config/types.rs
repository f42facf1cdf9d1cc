//! Configuration types.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port for the HTTP trigger and presentation API.
pub const DEFAULT_PORT: u16 = 31995;

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("task-rollover/rollover.db")
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Daily rollover behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloverConfig {
    /// IANA zone for users without a (valid) timezone of their own.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Users rolled over in parallel.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Generate next month's tasks once it is this many days away (0 = never early).
    #[serde(default)]
    pub generation_lookahead_days: i64,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            max_concurrency: default_max_concurrency(),
            generation_lookahead_days: 0,
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub rollover: RolloverConfig,
}

impl Config {
    /// Load a single configuration file with no tier merging.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Empty or comment-only files parse as null
        let config: Option<Config> = serde_yaml::from_str(&content)?;
        Ok(config.unwrap_or_default())
    }

    /// Ensure the database's parent directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
