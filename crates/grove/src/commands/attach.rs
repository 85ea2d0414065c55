//! Attach to an environment's tmux session.

use anyhow::{bail, Result};
use grove_core::tmux;

use super::{orchestrator, resolve_target};
use crate::config::Config;

pub fn execute(target: &str, project: Option<&str>, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;

    tmux::check_tmux()?;
    if !orch.status(&project, &env).session {
        bail!(
            "No session for {} (recreate the environment or start one with `tmux new -s {}`)",
            env.qualified_name(&project),
            env.session_name
        );
    }
    tmux::attach_session(&env.session_name)?;
    Ok(())
}
