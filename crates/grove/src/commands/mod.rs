//! Command implementations for grove CLI.
//!
//! Each submodule implements one command. Behavior lives in `grove-core`;
//! commands resolve their target, call the orchestrator and print results.

pub mod attach;
pub mod create;
pub mod destroy;
pub mod doctor;
pub mod env;
pub mod exec;
pub mod init;
pub mod list;
pub mod logs;
pub mod projects;
pub mod run;
pub mod stack;
pub mod status;

use anyhow::{Context, Result};
use colored::Colorize;
use grove_core::config::ProjectConfig;
use grove_core::db::{Environment, Project};
use grove_core::ports::Allocation;
use grove_core::{orchestrator, project, Database, Orchestrator, Toolchain};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;

/// Orchestrator over the configured registry and the system tools.
pub fn orchestrator(config: &Config) -> Result<Orchestrator> {
    let db = Arc::new(config.open_registry()?);
    Ok(Orchestrator::new(db, Toolchain::system()))
}

pub fn cwd() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to read current directory")
}

/// Project named by `--project`, or the one containing the current directory.
pub fn current_project(db: &Database, name: Option<&str>) -> Result<Project> {
    let cwd = cwd()?;
    project::find_project(db, name, &cwd).with_context(|| match name {
        Some(name) => format!("No project named {name}"),
        None => "Not inside a grove project (run `grove init` first)".to_string(),
    })
}

/// Resolve a command target.
///
/// `--project` and `project/env` are exact. A bare name prefers the project
/// containing the current directory, then searches every project.
pub fn resolve_target(
    orch: &Orchestrator,
    target: &str,
    project: Option<&str>,
) -> Result<(Project, Environment)> {
    let db = orch.db();
    if project.is_some() {
        let project = current_project(db, project)?;
        let env = orch.environment(&project, target)?;
        return Ok((project, env));
    }

    if !target.contains('/') {
        if let Ok(here) = project::find_project(db, None, &cwd()?) {
            if let Some(env) = db.get_environment(here.id, target)? {
                return Ok((here, env));
            }
        }
    }

    Ok(orchestrator::resolve(db, target)?)
}

pub fn project_config(project: &Project) -> Result<ProjectConfig> {
    Ok(ProjectConfig::load(&project.root_path)?)
}

pub fn print_allocations(allocations: &[Allocation]) {
    if allocations.is_empty() {
        return;
    }
    println!("  {}", "Ports:".cyan());
    for a in allocations {
        println!(
            "    {:<16} {} → {}",
            a.service,
            a.container_port,
            format!("localhost:{}", a.host_port).green()
        );
    }
}

pub fn print_warning(message: impl std::fmt::Display) {
    println!("  {} {}", "⚠".yellow(), message);
}
