//! Tiered configuration loading.
//!
//! Built-in defaults, then the project file, then the user file, then
//! environment variables. YAML tiers are merged key by key, so a file only
//! needs the keys it changes.

use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a setting came from (lowest to highest priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// `./task-rollover` and `~/.task-rollover`.
    pub fn discover() -> Self {
        Self {
            project_dir: Some(PathBuf::from("task-rollover")),
            user_dir: dirs::home_dir().map(|h| h.join(".task-rollover")),
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    fn file(&self, tier: ConfigTier) -> Option<PathBuf> {
        let dir = match tier {
            ConfigTier::Project => self.project_dir.as_ref(),
            ConfigTier::User => self.user_dir.as_ref(),
            _ => None,
        }?;
        Some(dir.join("config.yaml"))
    }
}

/// Loads and holds the merged configuration.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Files that contributed, in merge order.
    sources: Vec<PathBuf>,
    /// Tiers that contributed, lowest priority first.
    tiers: Vec<ConfigTier>,
}

impl ConfigLoader {
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load with explicit directories.
    ///
    /// `TASK_ROLLOVER_CONFIG_PATH` replaces the file tiers with a single file.
    /// Environment overrides apply either way.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        let mut sources = Vec::new();
        let mut tiers = vec![ConfigTier::Defaults];
        debug!(tier = %ConfigTier::Defaults, "Seeded config defaults");

        if let Ok(explicit) = std::env::var("TASK_ROLLOVER_CONFIG_PATH") {
            let path = PathBuf::from(explicit);
            let overlay = read_yaml(&path)?
                .with_context(|| format!("config file {} not found", path.display()))?;
            debug!(tier = %ConfigTier::User, path = %path.display(), "Loaded explicit config file");
            merge_into(&mut merged, overlay);
            sources.push(path);
            // Stands in for both file tiers
            tiers.push(ConfigTier::User);
        } else {
            for tier in [ConfigTier::Project, ConfigTier::User] {
                let Some(path) = paths.file(tier) else {
                    continue;
                };
                match read_yaml(&path) {
                    Ok(Some(overlay)) => {
                        debug!(tier = %tier, path = %path.display(), "Loaded config tier");
                        merge_into(&mut merged, overlay);
                        sources.push(path);
                        tiers.push(tier);
                    }
                    Ok(None) => {}
                    // A broken optional tier should not stop the process
                    Err(e) => warn!(tier = %tier, path = %path.display(), error = %e, "Ignoring config file"),
                }
            }
        }

        let mut config: Config =
            serde_json::from_value(merged).context("invalid merged configuration")?;
        let overridden = apply_env_overrides(&mut config)?;
        if !overridden.is_empty() {
            debug!(tier = %ConfigTier::Environment, vars = ?overridden, "Applied config overrides");
            tiers.push(ConfigTier::Environment);
        }

        Ok(Self {
            paths,
            config,
            sources,
            tiers,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn tiers(&self) -> &[ConfigTier] {
        &self.tiers
    }
}

/// Read a YAML file as a JSON value; `None` when the file does not exist.
fn read_yaml(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Overlay `overlay` onto `base`. Maps merge per key, a null leaves the base
/// value alone, anything else replaces it.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

/// Apply `TASK_ROLLOVER_*` overrides, returning the variables that were set.
fn apply_env_overrides(config: &mut Config) -> Result<Vec<&'static str>> {
    let mut applied = Vec::new();
    if let Ok(db_path) = std::env::var("TASK_ROLLOVER_DB_PATH") {
        config.server.db_path = PathBuf::from(db_path);
        applied.push("TASK_ROLLOVER_DB_PATH");
    }
    if let Ok(tz) = std::env::var("TASK_ROLLOVER_DEFAULT_TZ") {
        config.rollover.default_timezone = tz;
        applied.push("TASK_ROLLOVER_DEFAULT_TZ");
    }
    if let Ok(port) = std::env::var("TASK_ROLLOVER_PORT") {
        config.server.port = port
            .parse()
            .with_context(|| format!("TASK_ROLLOVER_PORT is not a port number: {}", port))?;
        applied.push("TASK_ROLLOVER_PORT");
    }
    Ok(applied)
}
