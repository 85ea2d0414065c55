//! Environment status command.
//!
//! Shows mode, container state, session and worktree presence, and the
//! host ports the stack is using. Supports JSON output for scripting.

use anyhow::Result;
use colored::Colorize;
use grove_core::orchestrator::EnvironmentStatus;
use grove_core::ports::Allocation;
use serde::Serialize;

use super::list::containers_label;
use super::{orchestrator, print_allocations, print_warning, resolve_target};
use crate::config::Config;

#[derive(Debug, Serialize)]
struct StatusReport {
    project: String,
    name: String,
    id: i64,
    branch: String,
    path: String,
    container_project: String,
    session_name: String,
    #[serde(flatten)]
    status: EnvironmentStatus,
    ports: Vec<Allocation>,
}

pub fn execute(target: &str, project: Option<&str>, json: bool, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;
    let status = orch.status(&project, &env);
    let (ports, port_error) = match orch.allocations_for(&project, &env) {
        Ok(ports) => (ports, None),
        Err(e) => (Vec::new(), Some(e)),
    };

    if json {
        let report = StatusReport {
            project: project.name.clone(),
            name: env.name.clone(),
            id: env.id,
            branch: env.branch.clone(),
            path: env.path.to_string_lossy().to_string(),
            container_project: env.container_project.clone(),
            session_name: env.session_name.clone(),
            status,
            ports,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", env.qualified_name(&project).cyan().bold());
    println!("  Branch:     {}", env.branch);
    println!(
        "  Worktree:   {} {}",
        env.path.display(),
        if status.worktree { "".normal() } else { "(missing)".red() }
    );
    println!("  Mode:       {}", status.mode);
    if !env.is_simple_mode() {
        println!(
            "  Containers: {} ({})",
            containers_label(&status),
            env.container_project
        );
    }
    println!(
        "  Session:    {} {}",
        env.session_name,
        if status.session { "✓".green() } else { "(not running)".yellow() }
    );
    print_allocations(&ports);
    if let Some(e) = port_error {
        print_warning(format!("Could not determine ports: {e}"));
    }
    Ok(())
}
