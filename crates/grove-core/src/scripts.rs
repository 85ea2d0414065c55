//! User lifecycle scripts (`prepare`, `setup`, `destroy`).

use crate::error::Result;
use crate::process::Cmd;
use std::path::Path;
use tracing::info;

/// Runs a configured script with environment variables exported.
pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str, dir: &Path, env: &[(String, String)]) -> Result<()>;
}

/// Runs scripts through `sh -c`, streaming their output to the terminal.
///
/// Scripts are user-owned and run without a deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellScripts {
    capture: bool,
}

#[cfg(test)]
impl ShellScripts {
    /// Capture output instead of streaming it.
    fn captured() -> Self {
        Self { capture: true }
    }
}

impl ScriptRunner for ShellScripts {
    fn run(&self, script: &str, dir: &Path, env: &[(String, String)]) -> Result<()> {
        let mut cmd = Cmd::new("sh")
            .args(["-c", script])
            .dir(dir)
            .envs(env.iter().cloned())
            .no_timeout();
        if !self.capture {
            cmd = cmd.passthrough();
        }
        cmd.run()?;
        info!("Script finished in {:?}", dir);
        Ok(())
    }
}
