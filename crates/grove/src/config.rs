//! Configuration management for grove.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (GROVE_CONFIG, GROVE_STATE_DB)
//! 2. Config file (~/.config/grove/config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use grove_core::Database;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Create defaults
    #[serde(default)]
    pub create: CreateConfig,

    /// Destroy defaults
    #[serde(default)]
    pub destroy: DestroyConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// SQLite file; `GROVE_STATE_DB` takes precedence, then ~/.grove/state.db
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConfig {
    /// Attach to the tmux session once the environment is ready
    #[serde(default)]
    pub attach: bool,

    /// Create a tmux session for new environments
    #[serde(default = "default_true")]
    pub session: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyConfig {
    /// Remove named volumes on destroy
    #[serde(default)]
    pub volumes: bool,

    /// Delete the environment branch on destroy
    #[serde(default)]
    pub delete_branch: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self {
            attach: false,
            session: default_true(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "grove", "grove") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".grove")
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!("No config at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("GROVE_CONFIG") {
            PathBuf::from(path)
        } else {
            default_config_dir().join("config.toml")
        }
    }

    /// Registry location after applying overrides.
    pub fn registry_path(&self) -> Result<PathBuf> {
        if std::env::var_os("GROVE_STATE_DB").is_none() {
            if let Some(ref path) = self.registry.path {
                return Ok(path.clone());
            }
        }
        Ok(Database::central_path()?)
    }

    /// Open the registry, creating it on first use.
    pub fn open_registry(&self) -> Result<Database> {
        let path = self.registry_path()?;
        debug!("Opening registry at {:?}", path);
        Database::open_path(&path)
            .with_context(|| format!("Failed to open registry at {}", path.display()))
    }
}
