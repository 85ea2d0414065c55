//! Commands that attach the terminal to a service container: exec, shell.

use anyhow::Result;
use colored::Colorize;
use grove_core::orchestrator::StackOutcome;

use super::{orchestrator, project_config, resolve_target};
use crate::config::Config;

pub fn execute(
    target: &str,
    service: &str,
    command: &[String],
    project: Option<&str>,
    config: &Config,
) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;

    if let StackOutcome::SimpleMode = orch.exec(&project, &env.name, service, command)? {
        print_simple_mode(&env.name);
    }
    Ok(())
}

pub fn shell(target: &str, service: &str, project: Option<&str>, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;
    let project_config = project_config(&project)?;

    if let StackOutcome::SimpleMode = orch.shell(&project, &env.name, service, &project_config)? {
        print_simple_mode(&env.name);
    }
    Ok(())
}

fn print_simple_mode(env: &str) {
    println!(
        "{} {}: simple mode, run commands in the worktree directly",
        "○".yellow(),
        env
    );
}
