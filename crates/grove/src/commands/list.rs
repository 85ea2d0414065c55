//! Environment listing command.

use anyhow::Result;
use colored::Colorize;
use grove_core::db::{Environment, Project};
use grove_core::docker::ContainerStatus;
use grove_core::orchestrator::{EnvironmentStatus, Mode};
use grove_core::Orchestrator;
use serde::Serialize;

use super::{current_project, orchestrator};
use crate::config::Config;

#[derive(Debug, Serialize)]
struct ListEntry {
    project: String,
    name: String,
    branch: String,
    path: String,
    #[serde(flatten)]
    status: EnvironmentStatus,
}

pub fn execute(all: bool, project: Option<&str>, json: bool, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let projects = if all {
        orch.db().list_projects()?
    } else {
        vec![current_project(orch.db(), project)?]
    };

    let mut groups = Vec::new();
    for project in projects {
        let envs = orch.db().list_environments(project.id)?;
        groups.push((project, envs));
    }

    if json {
        let orch = &orch;
        let entries: Vec<ListEntry> = groups
            .iter()
            .flat_map(|(p, envs)| envs.iter().map(move |e| entry(orch, p, e)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (project, envs) in &groups {
        println!("{}", project.name.cyan().bold());
        if envs.is_empty() {
            println!("  {}", "(no environments)".dimmed());
            continue;
        }
        for env in envs {
            let status = orch.status(project, env);
            println!(
                "  {:<24} {:<10} {:<10} {}",
                env.name,
                status.mode.to_string(),
                containers_label(&status),
                if status.session { "session" } else { "" }
            );
        }
    }
    Ok(())
}

fn entry(orch: &Orchestrator, project: &Project, env: &Environment) -> ListEntry {
    ListEntry {
        project: project.name.clone(),
        name: env.name.clone(),
        branch: env.branch.clone(),
        path: env.path.to_string_lossy().to_string(),
        status: orch.status(project, env),
    }
}

pub fn containers_label(status: &EnvironmentStatus) -> colored::ColoredString {
    match (status.mode, status.containers) {
        (Mode::Simple, _) | (_, None) => "-".dimmed(),
        (_, Some(ContainerStatus::Running)) => "running".green(),
        (_, Some(ContainerStatus::Stopped)) => "stopped".yellow(),
        (_, Some(ContainerStatus::Unknown)) => "unknown".dimmed(),
    }
}
