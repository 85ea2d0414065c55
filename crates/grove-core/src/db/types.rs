//! Registry types for grove-core.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project control directory.
pub const CONTROL_DIR: &str = ".grove";

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    /// Canonical repository root; unique across projects.
    pub root_path: PathBuf,
    /// Detected compose file name at init time, empty when none.
    pub compose_file: String,
    /// Compose directory relative to the repository root, empty for the root.
    pub compose_dir: String,
    pub created_at: i64,
}

impl Project {
    pub fn control_dir(&self) -> PathBuf {
        self.root_path.join(CONTROL_DIR)
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.control_dir().join("worktrees")
    }

    pub fn data_dir(&self, env_name: &str) -> PathBuf {
        self.control_dir().join("data").join(env_name)
    }

    /// Directory holding the compose manifest inside `checkout`
    /// (the repository root or one of its worktrees).
    pub fn compose_dir_in(&self, checkout: &Path) -> PathBuf {
        if self.compose_dir.is_empty() {
            checkout.to_path_buf()
        } else {
            checkout.join(&self.compose_dir)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub branch: String,
    pub path: PathBuf,
    /// `docker compose -p` tag; empty means simple mode.
    pub container_project: String,
    pub session_name: String,
    pub created_at: i64,
}

impl Environment {
    /// Simple-mode environments have no container stack. Fixed at creation.
    pub fn is_simple_mode(&self) -> bool {
        self.container_project.is_empty()
    }

    pub fn compose_dir(&self, project: &Project) -> PathBuf {
        project.compose_dir_in(&self.path)
    }

    /// `project/env` label used for disambiguation.
    pub fn qualified_name(&self, project: &Project) -> String {
        format!("{}/{}", project.name, self.name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Types (for creating entities)
// ─────────────────────────────────────────────────────────────────────────────

/// Input for registering a project
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub root_path: PathBuf,
    pub compose_file: String,
    pub compose_dir: String,
}

/// Input for recording a provisioned environment
#[derive(Debug, Clone)]
pub struct NewEnvironment {
    pub project_id: i64,
    pub name: String,
    pub branch: String,
    pub path: PathBuf,
    pub container_project: String,
    pub session_name: String,
}
