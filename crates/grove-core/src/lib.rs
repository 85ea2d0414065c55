//! grove-core - Core library for grove
//!
//! Per-branch development environments built from a git worktree, an
//! isolated docker compose stack and a tmux session:
//!
//! - **db**: SQLite registry of projects and environments
//! - **ports**: Deterministic host port allocation per environment
//! - **compose**: Compose manifest parsing and isolation
//! - **docker**: `docker compose` driver and port discovery
//! - **worktree**: Git worktree operations
//! - **tmux**: tmux session layout and management
//! - **orchestrator**: Create/destroy/up/down/restart with rollback
//! - **project**: Project initialization and lookup

pub mod compose;
pub mod config;
pub mod db;
pub mod docker;
pub mod env;
pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod process;
pub mod project;
pub mod scripts;
pub mod tmux;
pub mod worktree;

// Re-export commonly used types
pub use db::Database;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, Toolchain};
