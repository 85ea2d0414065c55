//! Error types for grove-core.

use thiserror::Error;

/// Result type alias using grove-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for grove operations
#[derive(Error, Debug)]
pub enum Error {
    // Registry errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Environment {name:?} already exists in project {project:?}")]
    AlreadyExists { project: String, name: String },

    #[error("Multiple environments named {name:?} found: {} (use project/env syntax)", candidates.join(", "))]
    Ambiguous { name: String, candidates: Vec<String> },

    #[error("Containers for {0} are not running")]
    NotRunning(String),

    // Compose manifest errors
    #[error("No compose file found in {dir}")]
    ManifestNotFound { dir: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Port range exhausted for environment {environment_id}: {requested} ports requested, 100 available")]
    PortRangeExhausted { environment_id: i64, requested: usize },

    #[error("Environment id {0} maps outside the valid host port range")]
    PortRangeInvalid(i64),

    // tmux errors
    #[error("tmux not found. Install tmux to use grove sessions.")]
    TmuxNotFound,

    #[error("tmux error: {0}")]
    Tmux(String),

    // Git/Worktree errors
    #[error("Not a git repository: {0}")]
    NotGitRepo(String),

    #[error("Worktree error: {0}")]
    Worktree(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Command execution errors
    #[error("Command failed: {cmd}\n{stderr}")]
    CommandFailed { cmd: String, stderr: String },

    #[error("Command timed out after {secs}s: {cmd}")]
    Timeout { cmd: String, secs: u64 },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an error from a command failure
    pub fn command_failed(cmd: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            cmd: cmd.into(),
            stderr: stderr.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// True for lookup misses (project or environment).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when an external collaborator failed or hung.
    pub fn is_external_tool_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::ConfigInvalid(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ConfigInvalid(e.to_string())
    }
}
