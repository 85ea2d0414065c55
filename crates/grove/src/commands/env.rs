//! Print an environment's derived variables.
//!
//! `eval "$(grove env feat)"` exports them into the current shell.

use anyhow::Result;

use super::{orchestrator, resolve_target};
use crate::config::Config;

pub fn execute(target: &str, project: Option<&str>, json: bool, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;
    let vars = orch.env_vars(&project, &env)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&vars.to_json())?);
    } else {
        println!("{}", vars.to_shell_export());
    }
    Ok(())
}
