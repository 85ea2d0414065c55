//! Container runtime integration via `docker compose`.
//!
//! Every invocation is scoped with `-p <tag>` so that environments sharing a
//! manifest never see each other's containers, and with `-f` on the
//! environment's isolated manifest once it exists so that compose resolves
//! the rewritten network and volume names.

use crate::error::{Error, Result};
use crate::ports::Allocation;
use crate::process::{Cmd, COMPOSE_TIMEOUT, COMPOSE_UP_TIMEOUT, SHORT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Unknown,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One container reported by `docker compose ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub service: String,
    pub state: String,
    pub health: String,
}

/// Ports actually bound by the running stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDiscovery {
    pub allocations: Vec<Allocation>,
    pub containers: Vec<ContainerInfo>,
    pub running: usize,
    pub total: usize,
}

/// What `logs` should print.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsOptions {
    /// One service, or every service when `None`.
    pub service: Option<String>,
    pub follow: bool,
    /// Lines per container to print before following.
    pub tail: Option<u32>,
}

/// Container stack operations the orchestrator depends on.
///
/// `manifest` is a file name relative to `dir`.
pub trait ContainerRuntime: Send + Sync {
    fn status(&self, dir: &Path, tag: &str, manifest: &str) -> ContainerStatus;

    /// Start the stack in the background.
    fn start(&self, dir: &Path, tag: &str, manifest: &str) -> Result<()>;

    fn stop(&self, dir: &Path, tag: &str, manifest: &str, remove_volumes: bool) -> Result<()>;

    /// Restart one service, or the whole stack when `service` is `None`.
    fn restart(&self, dir: &Path, tag: &str, manifest: &str, service: Option<&str>)
        -> Result<()>;

    fn discover_ports(&self, dir: &Path, tag: &str, manifest: &str) -> Result<PortDiscovery>;

    /// Print service logs to the terminal.
    fn logs(&self, dir: &Path, tag: &str, manifest: &str, opts: &LogsOptions) -> Result<()>;

    /// Run `command` inside a running service, attached to the terminal.
    fn exec(
        &self,
        dir: &Path,
        tag: &str,
        manifest: &str,
        service: &str,
        command: &[String],
    ) -> Result<()>;
}

/// [`ContainerRuntime`] backed by the `docker compose` CLI.
#[derive(Debug, Clone, Default)]
pub struct DockerCompose {
    stream_output: bool,
}

impl DockerCompose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `up` output (pulls, builds) to the terminal instead of capturing it.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }

    fn compose(dir: &Path, tag: &str, manifest: &str) -> Cmd {
        let cmd = Cmd::new("docker").args(["compose", "-p", tag]).dir(dir);
        if dir.join(manifest).is_file() {
            cmd.args(["-f", manifest])
        } else {
            debug!("No {} in {:?}, addressing {} by project only", manifest, dir, tag);
            cmd
        }
    }
}

impl ContainerRuntime for DockerCompose {
    fn status(&self, dir: &Path, tag: &str, manifest: &str) -> ContainerStatus {
        let all = match Self::compose(dir, tag, manifest).args(["ps", "-q"]).run() {
            Ok(out) => out,
            Err(e) => {
                debug!("Container status unavailable for {}: {}", tag, e);
                return ContainerStatus::Unknown;
            }
        };
        if all.is_empty() {
            return ContainerStatus::Stopped;
        }
        match Self::compose(dir, tag, manifest)
            .args(["ps", "--status", "running", "-q"])
            .run()
        {
            Ok(running) if !running.is_empty() => ContainerStatus::Running,
            Ok(_) => ContainerStatus::Stopped,
            Err(_) => ContainerStatus::Unknown,
        }
    }

    fn start(&self, dir: &Path, tag: &str, manifest: &str) -> Result<()> {
        let mut cmd = Self::compose(dir, tag, manifest)
            .args(["up", "-d"])
            .timeout(COMPOSE_UP_TIMEOUT);
        if self.stream_output {
            cmd = cmd.passthrough();
        }
        cmd.run()?;
        info!("Started containers for {}", tag);
        Ok(())
    }

    fn stop(&self, dir: &Path, tag: &str, manifest: &str, remove_volumes: bool) -> Result<()> {
        let mut cmd = Self::compose(dir, tag, manifest)
            .arg("down")
            .timeout(COMPOSE_TIMEOUT);
        if remove_volumes {
            cmd = cmd.arg("-v");
        }
        cmd.run()?;
        info!("Stopped containers for {}", tag);
        Ok(())
    }

    fn restart(
        &self,
        dir: &Path,
        tag: &str,
        manifest: &str,
        service: Option<&str>,
    ) -> Result<()> {
        let mut cmd = Self::compose(dir, tag, manifest)
            .arg("restart")
            .timeout(COMPOSE_TIMEOUT);
        if let Some(service) = service {
            cmd = cmd.arg(service);
        }
        cmd.run()?;
        Ok(())
    }

    fn discover_ports(&self, dir: &Path, tag: &str, manifest: &str) -> Result<PortDiscovery> {
        let out = Self::compose(dir, tag, manifest)
            .args(["ps", "--format", "json"])
            .timeout(SHORT_TIMEOUT * 2)
            .run()?;
        Ok(parse_ps_json(&out))
    }

    fn logs(&self, dir: &Path, tag: &str, manifest: &str, opts: &LogsOptions) -> Result<()> {
        logs_command(dir, tag, manifest, opts).run()?;
        Ok(())
    }

    fn exec(
        &self,
        dir: &Path,
        tag: &str,
        manifest: &str,
        service: &str,
        command: &[String],
    ) -> Result<()> {
        Self::compose(dir, tag, manifest)
            .args(["exec", service])
            .args(command.iter().cloned())
            .interactive()
            .run()?;
        Ok(())
    }
}

fn logs_command(dir: &Path, tag: &str, manifest: &str, opts: &LogsOptions) -> Cmd {
    let mut cmd = DockerCompose::compose(dir, tag, manifest)
        .arg("logs")
        .passthrough();
    if let Some(tail) = opts.tail {
        cmd = cmd.args(["--tail".to_string(), tail.to_string()]);
    }
    cmd = if opts.follow {
        cmd.arg("-f").no_timeout()
    } else {
        cmd.timeout(COMPOSE_TIMEOUT)
    };
    if let Some(ref service) = opts.service {
        cmd = cmd.arg(service.as_str());
    }
    cmd
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    service: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    health: String,
    #[serde(default)]
    publishers: Option<Vec<Publisher>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Publisher {
    #[serde(default)]
    target_port: u16,
    #[serde(default)]
    published_port: u16,
}

/// Parse `docker compose ps --format json`.
///
/// Newer compose releases print one object per line, older ones a single
/// array. Unparseable lines are skipped.
pub fn parse_ps_json(output: &str) -> PortDiscovery {
    let trimmed = output.trim();
    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).unwrap_or_default()
    } else {
        trimmed
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    };

    let mut result = PortDiscovery::default();
    let mut seen = HashSet::new();
    for entry in entries {
        result.total += 1;
        if entry.state == "running" {
            result.running += 1;
        }
        for publisher in entry.publishers.as_deref().unwrap_or_default() {
            if publisher.published_port == 0 {
                continue;
            }
            if !seen.insert((entry.service.clone(), publisher.target_port)) {
                continue;
            }
            result.allocations.push(Allocation {
                service: entry.service.clone(),
                container_port: publisher.target_port,
                host_port: publisher.published_port,
            });
        }
        result.containers.push(ContainerInfo {
            name: entry.name,
            service: entry.service,
            state: entry.state,
            health: entry.health,
        });
    }
    result
        .allocations
        .sort_by(|a, b| (&a.service, a.container_port).cmp(&(&b.service, b.container_port)));
    result
}

/// Verify the docker CLI is installed and the daemon answers.
pub fn check_docker_available() -> Result<()> {
    if which::which("docker").is_err() {
        return Err(Error::command_failed("docker", "docker not found in PATH"));
    }
    let output = Cmd::new("docker").arg("info").timeout(SHORT_TIMEOUT * 2).output()?;
    if output.success() {
        return Ok(());
    }
    let diagnostics = output.diagnostics();
    let lower = diagnostics.to_lowercase();
    if lower.contains("cannot connect")
        || lower.contains("is the docker daemon running")
        || lower.contains("connection refused")
    {
        return Err(Error::command_failed(
            "docker info",
            "docker daemon isn't running, please (re)start it",
        ));
    }
    Err(Error::command_failed("docker info", diagnostics))
}
