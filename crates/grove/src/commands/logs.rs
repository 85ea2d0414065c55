//! Container logs command.

use anyhow::Result;
use colored::Colorize;
use grove_core::docker::LogsOptions;
use grove_core::orchestrator::StackOutcome;

use super::{orchestrator, resolve_target};
use crate::config::Config;

pub fn execute(target: &str, opts: LogsOptions, project: Option<&str>, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;

    if let StackOutcome::SimpleMode = orch.logs(&project, &env.name, opts)? {
        println!("{} {}: simple mode, no container logs", "○".yellow(), env.name);
    }
    Ok(())
}
