//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Per-branch development environments
///
/// Each environment is a git worktree, an isolated docker compose stack and a
/// tmux session.
#[derive(Parser, Debug)]
#[command(name = "grove")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register the current git repository as a project
    Init {
        /// Repository directory (defaults to the current directory)
        path: Option<PathBuf>,

        /// Project name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Directory holding the compose file, relative to the repository root
        #[arg(long)]
        compose_dir: Option<String>,
    },

    /// Create an environment: worktree, containers and session
    Create {
        /// Environment name (also the branch name)
        name: String,

        /// Create the branch from this base instead of HEAD
        #[arg(short, long)]
        branch: Option<String>,

        /// Project name (defaults to the project containing the current directory)
        #[arg(short, long)]
        project: Option<String>,

        /// Skip creating the tmux session
        #[arg(long)]
        no_session: bool,

        /// Attach to the session after creating it
        #[arg(short, long)]
        attach: bool,
    },

    /// Destroy an environment and everything it owns
    Destroy {
        /// Environment name or project/env
        target: String,

        /// Also remove the stack's named volumes
        #[arg(long)]
        volumes: bool,

        /// Also delete the environment's branch
        #[arg(long)]
        delete_branch: bool,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Regenerate the isolated manifest and start containers
    Up {
        target: String,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Stop an environment's containers
    Down {
        target: String,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Restart an environment's containers
    Restart {
        target: String,

        /// Restart only this service
        service: Option<String>,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Show an environment's container logs
    Logs {
        target: String,

        /// Only this service's logs
        service: Option<String>,

        /// Keep following new output
        #[arg(short, long)]
        follow: bool,

        /// Lines per container to show before following
        #[arg(long, value_name = "N")]
        tail: Option<u32>,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Run a command inside one of an environment's services
    Exec {
        target: String,

        service: String,

        /// Command and arguments, passed through unchanged
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Open the configured shell inside one of an environment's services
    Shell {
        target: String,

        service: String,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// List environments
    List {
        /// Environments of every project
        #[arg(short, long)]
        all: bool,

        #[arg(short, long)]
        project: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an environment's status and ports
    Status {
        target: String,

        #[arg(short, long)]
        project: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print an environment's variables
    Env {
        target: String,

        #[arg(short, long)]
        project: Option<String>,

        /// Output as JSON instead of shell exports
        #[arg(long)]
        json: bool,
    },

    /// Attach to an environment's tmux session
    Attach {
        target: String,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Run the project's `run` script inside an environment
    Run {
        target: String,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// List registered projects
    Projects {
        /// Unregister a project (must have no environments)
        #[arg(long, value_name = "NAME")]
        remove: Option<String>,
    },

    /// Run diagnostics
    Doctor,

    /// Show version
    Version,
}
