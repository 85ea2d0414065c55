//! Run the project's `run` script inside an environment.

use anyhow::Result;
use colored::Colorize;

use super::{orchestrator, project_config, resolve_target};
use crate::config::Config;

pub fn execute(target: &str, project: Option<&str>, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;
    let project_config = project_config(&project)?;

    println!("{} {}", "Running in".cyan(), env.qualified_name(&project));
    orch.run_script(&project, &env.name, &project_config)?;
    Ok(())
}
