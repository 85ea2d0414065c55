//! Per-project configuration loaded from `.grove.toml` at the project root.
//!
//! ```toml
//! [scripts]
//! prepare = "cp .env.example .env"
//! setup = "npm run migrate"
//! run = "npm run dev"
//! destroy = "rm -rf tmp/"
//!
//! [shells]
//! db = "psql -U postgres"
//! web = "bash"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_FILE: &str = ".grove.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub scripts: Scripts,

    /// Shell to open in each service's session window (default `sh`).
    #[serde(default)]
    pub shells: BTreeMap<String, String>,
}

/// Lifecycle hooks, each run through `sh -c`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scripts {
    /// Before containers start during create.
    pub prepare: Option<String>,
    /// After containers start during create.
    pub setup: Option<String>,
    /// Long-running dev command for `grove run`.
    pub run: Option<String>,
    /// Before teardown during destroy.
    pub destroy: Option<String>,
}

impl ProjectConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(PROJECT_CONFIG_FILE)
    }

    /// Load the config for a project root. A missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Self::parse(&content).map_err(|e| match e {
            Error::ConfigInvalid(msg) => {
                Error::ConfigInvalid(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        for (name, script) in config.scripts.entries() {
            if script.trim().is_empty() {
                return Err(Error::ConfigInvalid(format!("scripts.{name} is empty")));
            }
        }
        Ok(config)
    }

    /// Shell override for a service, if any.
    pub fn shell_for(&self, service: &str) -> Option<&str> {
        self.shells.get(service).map(String::as_str)
    }
}

impl Scripts {
    fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("prepare", &self.prepare),
            ("setup", &self.setup),
            ("run", &self.run),
            ("destroy", &self.destroy),
        ]
        .into_iter()
        .filter_map(|(name, script)| script.as_deref().map(|s| (name, s)))
    }
}
