//! Container stack commands: up, down, restart.

use anyhow::Result;
use colored::Colorize;
use grove_core::orchestrator::{RestartOptions, StackOutcome};

use super::{orchestrator, print_allocations, resolve_target};
use crate::config::Config;

const SIMPLE_MODE: &str = "simple mode, no containers";

pub fn up(target: &str, project: Option<&str>, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;

    match orch.up(&project, &env.name)? {
        StackOutcome::SimpleMode => println!("{} {}: {}", "○".yellow(), env.name, SIMPLE_MODE),
        StackOutcome::Applied(allocations) => {
            println!("{} Started {}", "✓".green(), env.container_project.bold());
            print_allocations(&allocations);
        }
    }
    Ok(())
}

pub fn down(target: &str, project: Option<&str>, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;

    match orch.down(&project, &env.name)? {
        StackOutcome::SimpleMode => println!("{} {}: {}", "○".yellow(), env.name, SIMPLE_MODE),
        StackOutcome::Applied(()) => {
            println!("{} Stopped {}", "✓".green(), env.container_project.bold())
        }
    }
    Ok(())
}

pub fn restart(
    target: &str,
    service: Option<String>,
    project: Option<&str>,
    config: &Config,
) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;
    let label = service.clone();

    match orch.restart(&project, &env.name, RestartOptions { service })? {
        StackOutcome::SimpleMode => println!("{} {}: {}", "○".yellow(), env.name, SIMPLE_MODE),
        StackOutcome::Applied(()) => match label {
            Some(service) => println!(
                "{} Restarted {} in {}",
                "✓".green(),
                service.bold(),
                env.container_project
            ),
            None => println!("{} Restarted {}", "✓".green(), env.container_project.bold()),
        },
    }
    Ok(())
}
