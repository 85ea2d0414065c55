//! tmux integration for environment sessions.
//!
//! An environment session has a `shell` window in the worktree, one window
//! per compose service attached to a shell inside its container, and a
//! `logs` window following the stack's output.

use crate::error::{Error, Result};
use crate::process::{Cmd, SHORT_TIMEOUT};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

pub const SHELL_WINDOW: &str = "shell";
pub const LOGS_WINDOW: &str = "logs";
pub const DEFAULT_CONTAINER_SHELL: &str = "sh";

/// Session operations the orchestrator depends on.
pub trait SessionManager: Send + Sync {
    fn create(&self, layout: &SessionLayout) -> Result<()>;

    /// Kill a session. Missing sessions are not an error.
    fn kill(&self, name: &str) -> Result<()>;

    fn exists(&self, name: &str) -> bool;
}

/// Session name for an environment. tmux reserves `.` and `:` in targets.
pub fn session_name(project: &str, env: &str) -> String {
    format!("grove/{project}/{env}").replace(['.', ':'], "-")
}

/// True when running inside a tmux client.
pub fn is_inside_tmux() -> bool {
    std::env::var_os("TMUX").is_some_and(|v| !v.is_empty())
}

/// Check if tmux is installed and available.
pub fn check_tmux() -> Result<()> {
    match which::which("tmux") {
        Ok(path) => {
            debug!("Found tmux at: {:?}", path);
            Ok(())
        }
        Err(_) => Err(Error::TmuxNotFound),
    }
}

/// Exact-match target; plain `-t name` would also match by prefix.
fn exact(name: &str) -> String {
    format!("={name}")
}

fn window(name: &str, window: &str) -> String {
    format!("={name}:{window}")
}

/// [`SessionManager`] backed by the tmux CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tmux;

impl Tmux {
    fn tmux<I, S>(args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::new("tmux").args(args).timeout(SHORT_TIMEOUT)
    }
}

impl SessionManager for Tmux {
    fn create(&self, layout: &SessionLayout) -> Result<()> {
        check_tmux()?;
        if self.exists(&layout.session_name) {
            return Err(Error::Tmux(format!(
                "Session already exists: {}",
                layout.session_name
            )));
        }

        let mut steps = layout.commands().into_iter();
        if let Some(first) = steps.next() {
            Self::tmux(first)
                .run()
                .map_err(|e| Error::Tmux(e.to_string()))?;
        }
        for step in steps {
            if let Err(e) = Self::tmux(step).run() {
                let _ = self.kill(&layout.session_name);
                return Err(Error::Tmux(e.to_string()));
            }
        }

        debug!("Created tmux session: {}", layout.session_name);
        Ok(())
    }

    fn kill(&self, name: &str) -> Result<()> {
        if !self.exists(name) {
            return Ok(());
        }
        Self::tmux(["kill-session".to_string(), "-t".to_string(), exact(name)])
            .run()
            .map_err(|e| Error::Tmux(e.to_string()))?;
        debug!("Killed tmux session: {}", name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        Self::tmux(["has-session".to_string(), "-t".to_string(), exact(name)]).succeeds()
    }
}

/// Attach to a session, or switch the current client when already inside tmux.
pub fn attach_session(session_name: &str) -> Result<()> {
    if !Tmux.exists(session_name) {
        return Err(Error::Tmux(format!("Session not found: {session_name}")));
    }

    let verb = if is_inside_tmux() {
        "switch-client"
    } else {
        "attach-session"
    };
    // Interactive: inherit the terminal and wait without a deadline.
    let status = Command::new("tmux")
        .args([verb, "-t", &exact(session_name)])
        .status()?;

    if !status.success() {
        warn!("tmux {} exited with non-zero status", verb);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to lay out an environment session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLayout {
    pub session_name: String,
    pub work_dir: PathBuf,
    /// `docker compose -p` tag; `None` in simple mode.
    pub container_project: Option<String>,
    /// Absolute path of the isolated manifest, passed as `-f`.
    pub manifest: Option<PathBuf>,
    /// Services that get a container shell window, in manifest order.
    pub services: Vec<String>,
    /// Shell override per service (default `sh`).
    pub shells: BTreeMap<String, String>,
    /// Variables exported into the session.
    pub env: Vec<(String, String)>,
}

impl SessionLayout {
    /// tmux invocations that build this layout, in order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        let name = &self.session_name;
        let dir = self.work_dir.to_string_lossy().to_string();
        let mut cmds = Vec::new();

        let mut new_session = vec![
            "new-session".to_string(),
            "-d".to_string(),
            "-s".to_string(),
            name.clone(),
            "-c".to_string(),
            dir.clone(),
        ];
        for (key, value) in &self.env {
            new_session.push("-e".to_string());
            new_session.push(format!("{key}={value}"));
        }
        cmds.push(new_session);

        cmds.push(vec![
            "rename-window".to_string(),
            "-t".to_string(),
            exact(name),
            SHELL_WINDOW.to_string(),
        ]);

        let Some(ref tag) = self.container_project else {
            return cmds;
        };
        let compose = match self.manifest {
            Some(ref path) => format!(
                "docker compose -p {tag} -f {}",
                shell_quote(&path.to_string_lossy())
            ),
            None => format!("docker compose -p {tag}"),
        };

        let mut add_window = |window_name: &str, command: String| {
            cmds.push(vec![
                "new-window".to_string(),
                "-t".to_string(),
                exact(name),
                "-n".to_string(),
                window_name.to_string(),
                "-c".to_string(),
                dir.clone(),
            ]);
            cmds.push(vec![
                "send-keys".to_string(),
                "-t".to_string(),
                window(name, window_name),
                command,
                "Enter".to_string(),
            ]);
        };

        for service in &self.services {
            let shell = self
                .shells
                .get(service)
                .map(String::as_str)
                .unwrap_or(DEFAULT_CONTAINER_SHELL);
            add_window(service, format!("{compose} exec {service} {shell}"));
        }
        add_window(LOGS_WINDOW, format!("{compose} logs -f"));

        cmds.push(vec![
            "select-window".to_string(),
            "-t".to_string(),
            window(name, SHELL_WINDOW),
        ]);
        cmds
    }
}

/// Quote for the shell that runs `send-keys` input.
fn shell_quote(raw: &str) -> String {
    let plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:@".contains(c));
    if plain {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', "'\\''"))
    }
}
