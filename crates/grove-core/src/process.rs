//! Bounded external-process execution.
//!
//! Every git, docker and tmux invocation goes through [`Cmd`] so that a hung
//! tool cannot block an orchestrator call forever. Output pipes are drained by
//! helper threads while the calling thread waits on the `Child` with
//! `wait_timeout`; on expiry the child is killed and reaped.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Status checks and tmux calls.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(5);
/// git worktree operations and manifest queries.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);
/// `docker compose down` / `restart`.
pub const COMPOSE_TIMEOUT: Duration = Duration::from_secs(120);
/// `docker compose up` may pull images and build.
pub const COMPOSE_UP_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Diagnostic text for error reporting: stderr, or stdout when stderr is empty.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Builder for a bounded external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    passthrough: bool,
    interactive: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            env: BTreeMap::new(),
            timeout: Some(SHORT_TIMEOUT),
            passthrough: false,
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for the command indefinitely (user scripts).
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Let the child write to our stdout/stderr instead of capturing.
    /// Captured output is then empty.
    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    /// Hand the terminal to the child: stdin too, and no deadline.
    pub fn interactive(mut self) -> Self {
        self.passthrough = true;
        self.interactive = true;
        self.timeout = None;
        self
    }

    /// Human-readable command line, used in errors and logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Run and capture output. A nonzero exit is NOT an error here.
    pub fn output(&self) -> Result<CmdOutput> {
        debug!("Running: {}", self.display());

        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(&self.env);
        if self.interactive {
            command.stdin(Stdio::inherit());
        } else {
            command.stdin(Stdio::null());
        }
        if self.passthrough {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        if let Some(ref dir) = self.dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(limit) => match child.wait_timeout(limit)? {
                Some(status) => status,
                None => {
                    kill_and_reap(&mut child);
                    return Err(Error::Timeout {
                        cmd: self.display(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait()?,
        };

        Ok(CmdOutput {
            status,
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
        })
    }

    /// Run and fail with [`Error::CommandFailed`] on nonzero exit.
    /// Returns trimmed stdout.
    pub fn run(&self) -> Result<String> {
        let output = self.output()?;
        if !output.success() {
            let mut diagnostics = output.diagnostics();
            if diagnostics.is_empty() {
                diagnostics = output.status.to_string();
            }
            return Err(Error::command_failed(self.display(), diagnostics));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Run and report only whether the command exited successfully.
    /// Spawn failures and timeouts count as failure.
    pub fn succeeds(&self) -> bool {
        self.output().map(|o| o.success()).unwrap_or(false)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
