//! Environment lifecycle: create, destroy, up, down, restart, plus logs and
//! exec against a running stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                            │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────────────────┐ │
//! │  │  Registry  │   │ Port         │   │ Manifest transformer    │ │
//! │  │  (SQLite)  │   │ allocator    │→→│ (isolated compose file) │ │
//! │  └────────────┘   └──────────────┘   └─────────────────────────┘ │
//! │         │                                                        │
//! │  ┌──────┴────────────────── Toolchain ─────────────────────────┐ │
//! │  │ worktrees (git) │ containers (docker) │ sessions │ scripts │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Create pushes an undo action onto a [`Compensation`] stack after every
//! step that leaves something behind. Any later failure unwinds the stack
//! newest-first and returns the original error. Destroy is best-effort
//! except for the final registry delete.
//!
//! Whether an environment runs containers is decided once, at creation, by
//! the presence of a compose manifest. An empty `container_project` marks
//! simple mode for every later operation.

mod compensation;

pub use compensation::{Compensation, CompensationFailure};

use crate::compose::{container_project_name, detect_compose_file, ComposeManifest, ISOLATED_MANIFEST};
use crate::config::ProjectConfig;
use crate::db::{Database, Environment, NewEnvironment, Project};
use crate::docker::{ContainerRuntime, ContainerStatus, DockerCompose, LogsOptions};
use crate::env::EnvVars;
use crate::error::{Error, Result};
use crate::ports::{allocate, Allocation};
use crate::scripts::{ScriptRunner, ShellScripts};
use crate::tmux::{self, SessionLayout, SessionManager, Tmux};
use crate::worktree::{GitWorktrees, WorktreeInfo, WorktreeProvisioner};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// External tools the orchestrator drives.
#[derive(Clone)]
pub struct Toolchain {
    pub worktrees: Arc<dyn WorktreeProvisioner>,
    pub containers: Arc<dyn ContainerRuntime>,
    pub sessions: Arc<dyn SessionManager>,
    pub scripts: Arc<dyn ScriptRunner>,
}

impl Toolchain {
    /// git, docker compose, tmux and `sh`, with output streamed to the terminal.
    pub fn system() -> Self {
        Self {
            worktrees: Arc::new(GitWorktrees),
            containers: Arc::new(DockerCompose::new().streaming(true)),
            sessions: Arc::new(Tmux),
            scripts: Arc::new(ShellScripts::default()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options and outcomes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub name: String,
    /// Start the new branch from here instead of HEAD.
    pub base_branch: Option<String>,
    pub config: ProjectConfig,
    /// Create the tmux session (default true).
    pub session: bool,
}

impl CreateOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_branch: None,
            config: ProjectConfig::default(),
            session: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DestroyOptions {
    /// Also remove the stack's named volumes.
    pub remove_volumes: bool,
    /// Also delete the environment's branch.
    pub delete_branch: bool,
    pub config: ProjectConfig,
}

#[derive(Debug, Clone, Default)]
pub struct RestartOptions {
    /// Restart one service instead of the whole stack.
    pub service: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Simple,
    Container,
}

impl Mode {
    pub fn of(env: &Environment) -> Self {
        if env.is_simple_mode() {
            Self::Simple
        } else {
            Self::Container
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => f.write_str("simple"),
            Self::Container => f.write_str("container"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub environment: Environment,
    pub mode: Mode,
    pub allocations: Vec<Allocation>,
    pub data_dir: PathBuf,
}

/// Result of a container-stack operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOutcome<T = ()> {
    /// Simple-mode environment; nothing was done.
    SimpleMode,
    Applied(T),
}

impl<T> StackOutcome<T> {
    pub fn is_simple_mode(&self) -> bool {
        matches!(self, Self::SimpleMode)
    }
}

/// A destroy step that failed without stopping the teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyWarning {
    pub step: &'static str,
    pub message: String,
}

impl fmt::Display for DestroyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DestroyReport {
    pub warnings: Vec<DestroyWarning>,
}

impl DestroyReport {
    fn warn(&mut self, step: &'static str, message: impl fmt::Display) {
        warn!("Destroy step '{}' failed: {}", step, message);
        self.warnings.push(DestroyWarning {
            step,
            message: message.to_string(),
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub mode: Mode,
    /// `None` in simple mode, where containers are never queried.
    pub containers: Option<ContainerStatus>,
    pub session: bool,
    pub worktree: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Orchestrator {
    db: Arc<Database>,
    tools: Toolchain,
}

impl Orchestrator {
    pub fn new(db: Arc<Database>, tools: Toolchain) -> Self {
        Self { db, tools }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Look up an environment of `project` by name.
    pub fn environment(&self, project: &Project, name: &str) -> Result<Environment> {
        self.db
            .get_environment(project.id, name)?
            .ok_or_else(|| Error::not_found("environment", format!("{}/{}", project.name, name)))
    }

    /// Provision a worktree, registry row, optional container stack and session.
    pub fn create(&self, project: &Project, opts: CreateOptions) -> Result<CreateOutcome> {
        let name = opts.name.as_str();
        validate_env_name(name)?;
        if self.db.environment_exists(project.id, name)? {
            return Err(Error::AlreadyExists {
                project: project.name.clone(),
                name: name.to_string(),
            });
        }

        let base_path = project.worktrees_dir();
        fs::create_dir_all(&base_path)?;

        let worktree = self.tools.worktrees.provision(
            &project.root_path,
            name,
            &base_path,
            opts.base_branch.as_deref(),
        )?;
        info!("Created worktree {:?}", worktree.path);

        let mut undo = Compensation::new();
        let wt_path = worktree.path.clone();
        undo.push("remove worktree", move || {
            self.tools.worktrees.remove(&project.root_path, &wt_path)
        });

        match self.provision(project, &worktree, &opts, &mut undo) {
            Ok(outcome) => {
                undo.commit();
                info!("Environment {}/{} ready", project.name, name);
                Ok(outcome)
            }
            Err(e) => {
                warn!("Creating {}/{} failed, rolling back: {}", project.name, name, e);
                let failures = undo.unwind();
                if !failures.is_empty() {
                    warn!(
                        "{} rollback step(s) failed; manual cleanup may be needed",
                        failures.len()
                    );
                }
                Err(e)
            }
        }
    }

    /// Steps after the worktree exists. Each pushes its own undo action.
    fn provision<'a>(
        &'a self,
        project: &'a Project,
        worktree: &WorktreeInfo,
        opts: &CreateOptions,
        undo: &mut Compensation<'a>,
    ) -> Result<CreateOutcome> {
        let name = opts.name.as_str();

        let data_dir = project.data_dir(name);
        fs::create_dir_all(&data_dir)?;
        let dir = data_dir.clone();
        undo.push("remove data directory", move || remove_dir_if_exists(&dir));

        let compose_dir = project.compose_dir_in(&worktree.path);
        let mode = if detect_compose_file(&compose_dir).is_some() {
            Mode::Container
        } else {
            info!("No compose file in {:?}, using simple mode", compose_dir);
            Mode::Simple
        };
        let container_project = match mode {
            Mode::Container => container_project_name(&project.name, name),
            Mode::Simple => String::new(),
        };

        let env = self.db.insert_environment(&NewEnvironment {
            project_id: project.id,
            name: name.to_string(),
            branch: worktree.branch.clone(),
            path: worktree.path.clone(),
            container_project,
            session_name: tmux::session_name(&project.name, name),
        })?;
        let row_name = env.name.clone();
        undo.push("delete registry row", move || {
            self.db.delete_environment(project.id, &row_name)
        });

        let mut allocations = Vec::new();
        let mut services = Vec::new();
        if mode == Mode::Container {
            let (manifest, allocated) = write_isolated_manifest(project, &env, &compose_dir)?;
            services = manifest.service_names();
            allocations = allocated;
        }
        let vars = EnvVars::build(project, &env, &allocations).pairs();

        if let Some(script) = opts.config.scripts.prepare.as_deref() {
            info!("Running prepare script");
            self.tools.scripts.run(script, &worktree.path, &vars)?;
        }

        if mode == Mode::Container {
            // Registered first so a partially started stack is torn down too.
            let tag = env.container_project.clone();
            let dir = compose_dir.clone();
            undo.push("stop containers", move || {
                self.tools.containers.stop(&dir, &tag, ISOLATED_MANIFEST, true)
            });
            self.tools
                .containers
                .start(&compose_dir, &env.container_project, ISOLATED_MANIFEST)?;
        }

        if let Some(script) = opts.config.scripts.setup.as_deref() {
            info!("Running setup script");
            self.tools.scripts.run(script, &worktree.path, &vars)?;
        }

        if opts.session {
            let layout = SessionLayout {
                session_name: env.session_name.clone(),
                work_dir: worktree.path.clone(),
                container_project: (mode == Mode::Container).then(|| env.container_project.clone()),
                manifest: (mode == Mode::Container).then(|| compose_dir.join(ISOLATED_MANIFEST)),
                services,
                shells: opts.config.shells.clone(),
                env: vars,
            };
            self.tools.sessions.create(&layout)?;
            info!("Created session {}", env.session_name);
        }

        Ok(CreateOutcome {
            environment: env,
            mode,
            allocations,
            data_dir,
        })
    }

    /// Tear an environment down. Only the final registry delete is fatal.
    pub fn destroy(
        &self,
        project: &Project,
        name: &str,
        opts: DestroyOptions,
    ) -> Result<DestroyReport> {
        let env = self.environment(project, name)?;
        let mut report = DestroyReport::default();

        if let Some(script) = opts.config.scripts.destroy.as_deref() {
            if env.path.is_dir() {
                let allocations = self.formula_allocations(project, &env).unwrap_or_default();
                let vars = EnvVars::build(project, &env, &allocations).pairs();
                info!("Running destroy script");
                if let Err(e) = self.tools.scripts.run(script, &env.path, &vars) {
                    report.warn("destroy script", e);
                }
            } else {
                report.warn("destroy script", "worktree is missing, script skipped");
            }
        }

        if self.tools.sessions.exists(&env.session_name) {
            if let Err(e) = self.tools.sessions.kill(&env.session_name) {
                report.warn("kill session", e);
            }
        }

        if !env.is_simple_mode() {
            let dir = existing_dir(&env.compose_dir(project), &project.root_path);
            if let Err(e) = self.tools.containers.stop(
                &dir,
                &env.container_project,
                ISOLATED_MANIFEST,
                opts.remove_volumes,
            ) {
                report.warn("stop containers", e);
            }
        }

        if let Err(e) = self.tools.worktrees.remove(&project.root_path, &env.path) {
            report.warn("remove worktree", e);
        }

        if let Err(e) = remove_dir_if_exists(&project.data_dir(&env.name)) {
            report.warn("remove data directory", e);
        }

        if opts.delete_branch {
            match self.tools.worktrees.delete_branch(&project.root_path, &env.branch) {
                Ok(true) => info!("Deleted branch {}", env.branch),
                Ok(false) => debug!("Branch {} already gone", env.branch),
                Err(e) => report.warn("delete branch", e),
            }
        }

        self.db.delete_environment(project.id, &env.name)?;
        info!("Destroyed {}/{}", project.name, env.name);
        Ok(report)
    }

    /// Regenerate the isolated manifest and start the stack.
    pub fn up(&self, project: &Project, name: &str) -> Result<StackOutcome<Vec<Allocation>>> {
        let env = self.environment(project, name)?;
        if env.is_simple_mode() {
            info!("{} is a simple-mode environment, no containers to start", env.name);
            return Ok(StackOutcome::SimpleMode);
        }

        let compose_dir = env.compose_dir(project);
        let (_, allocations) = write_isolated_manifest(project, &env, &compose_dir)?;
        self.tools
            .containers
            .start(&compose_dir, &env.container_project, ISOLATED_MANIFEST)?;
        Ok(StackOutcome::Applied(allocations))
    }

    pub fn down(&self, project: &Project, name: &str) -> Result<StackOutcome> {
        let env = self.environment(project, name)?;
        if env.is_simple_mode() {
            info!("{} is a simple-mode environment, no containers to stop", env.name);
            return Ok(StackOutcome::SimpleMode);
        }
        let dir = existing_dir(&env.compose_dir(project), &project.root_path);
        self.tools
            .containers
            .stop(&dir, &env.container_project, ISOLATED_MANIFEST, false)?;
        Ok(StackOutcome::Applied(()))
    }

    pub fn restart(
        &self,
        project: &Project,
        name: &str,
        opts: RestartOptions,
    ) -> Result<StackOutcome> {
        let env = self.environment(project, name)?;
        if env.is_simple_mode() {
            info!("{} is a simple-mode environment, nothing to restart", env.name);
            return Ok(StackOutcome::SimpleMode);
        }

        let compose_dir = env.compose_dir(project);
        if let Some(ref service) = opts.service {
            check_service(&compose_dir, service)?;
        }

        let dir = existing_dir(&compose_dir, &project.root_path);
        self.tools.containers.restart(
            &dir,
            &env.container_project,
            ISOLATED_MANIFEST,
            opts.service.as_deref(),
        )?;
        Ok(StackOutcome::Applied(()))
    }

    /// Print the stack's logs, optionally following them.
    pub fn logs(&self, project: &Project, name: &str, opts: LogsOptions) -> Result<StackOutcome> {
        let env = self.environment(project, name)?;
        if env.is_simple_mode() {
            info!("{} is a simple-mode environment, no container logs", env.name);
            return Ok(StackOutcome::SimpleMode);
        }

        let compose_dir = env.compose_dir(project);
        if let Some(ref service) = opts.service {
            check_service(&compose_dir, service)?;
        }
        let dir = existing_dir(&compose_dir, &project.root_path);
        self.tools
            .containers
            .logs(&dir, &env.container_project, ISOLATED_MANIFEST, &opts)?;
        Ok(StackOutcome::Applied(()))
    }

    /// Run a command inside one of the environment's running services.
    pub fn exec(
        &self,
        project: &Project,
        name: &str,
        service: &str,
        command: &[String],
    ) -> Result<StackOutcome> {
        let env = self.environment(project, name)?;
        if env.is_simple_mode() {
            info!("{} is a simple-mode environment, no containers to exec into", env.name);
            return Ok(StackOutcome::SimpleMode);
        }
        if command.is_empty() {
            return Err(Error::ConfigInvalid("exec needs a command to run".into()));
        }

        let compose_dir = env.compose_dir(project);
        check_service(&compose_dir, service)?;
        let dir = existing_dir(&compose_dir, &project.root_path);
        self.tools.containers.exec(
            &dir,
            &env.container_project,
            ISOLATED_MANIFEST,
            service,
            command,
        )?;
        Ok(StackOutcome::Applied(()))
    }

    /// Open the service's configured shell (`[shells]`, default `sh`).
    pub fn shell(
        &self,
        project: &Project,
        name: &str,
        service: &str,
        config: &ProjectConfig,
    ) -> Result<StackOutcome> {
        let shell = config.shell_for(service).unwrap_or(tmux::DEFAULT_CONTAINER_SHELL);
        let command: Vec<String> = shell.split_whitespace().map(str::to_string).collect();
        self.exec(project, name, service, &command)
    }

    pub fn status(&self, project: &Project, env: &Environment) -> EnvironmentStatus {
        let containers = if env.is_simple_mode() {
            None
        } else {
            let dir = existing_dir(&env.compose_dir(project), &project.root_path);
            Some(
                self.tools
                    .containers
                    .status(&dir, &env.container_project, ISOLATED_MANIFEST),
            )
        };
        EnvironmentStatus {
            mode: Mode::of(env),
            containers,
            session: self.tools.sessions.exists(&env.session_name),
            worktree: env.path.is_dir(),
        }
    }

    /// Live host ports. Prefers what the running stack actually bound and
    /// falls back to the allocation formula.
    pub fn allocations_for(&self, project: &Project, env: &Environment) -> Result<Vec<Allocation>> {
        if env.is_simple_mode() {
            return Ok(Vec::new());
        }
        let dir = existing_dir(&env.compose_dir(project), &project.root_path);
        match self
            .tools
            .containers
            .discover_ports(&dir, &env.container_project, ISOLATED_MANIFEST)
        {
            Ok(found) if found.running > 0 && !found.allocations.is_empty() => {
                return Ok(found.allocations);
            }
            Ok(_) => debug!("No running containers for {}", env.container_project),
            Err(e) => debug!("Port discovery failed for {}: {}", env.container_project, e),
        }
        self.formula_allocations(project, env)
    }

    fn formula_allocations(&self, project: &Project, env: &Environment) -> Result<Vec<Allocation>> {
        if env.is_simple_mode() {
            return Ok(Vec::new());
        }
        match ComposeManifest::parse(&env.compose_dir(project)) {
            Ok(manifest) => manifest_allocations(env, &manifest),
            Err(Error::ManifestNotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn env_vars(&self, project: &Project, env: &Environment) -> Result<EnvVars> {
        let allocations = self.allocations_for(project, env)?;
        Ok(EnvVars::build(project, env, &allocations))
    }

    /// Run the configured `run` script inside the environment.
    pub fn run_script(&self, project: &Project, name: &str, config: &ProjectConfig) -> Result<()> {
        let script = config.scripts.run.as_deref().ok_or_else(|| {
            Error::ConfigInvalid("no run script defined (add scripts.run to .grove.toml)".into())
        })?;
        let env = self.environment(project, name)?;
        if !env.is_simple_mode() && self.status(project, &env).containers != Some(ContainerStatus::Running) {
            return Err(Error::NotRunning(env.qualified_name(project)));
        }
        let vars = self.env_vars(project, &env)?.pairs();
        self.tools.scripts.run(script, &env.path, &vars)
    }
}

/// Resolve `project/env` exactly, or a bare env name across all projects.
pub fn resolve(db: &Database, target: &str) -> Result<(Project, Environment)> {
    if let Some((project_name, env_name)) = target.split_once('/') {
        let project = db
            .get_project_by_name(project_name)?
            .ok_or_else(|| Error::not_found("project", project_name))?;
        let env = db
            .get_environment(project.id, env_name)?
            .ok_or_else(|| Error::not_found("environment", target))?;
        return Ok((project, env));
    }

    let mut matches = db.find_environments_by_name(target)?;
    match matches.len() {
        0 => Err(Error::not_found("environment", target)),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::Ambiguous {
            name: target.to_string(),
            candidates: matches.iter().map(|(p, e)| e.qualified_name(p)).collect(),
        }),
    }
}

/// Environment names become branch names, directory names and part of the
/// `project/env` syntax.
pub fn validate_env_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if name.is_empty()
        || !valid_chars
        || name.starts_with(['-', '.'])
        || name.ends_with(".lock")
        || name.contains("..")
    {
        return Err(Error::ConfigInvalid(format!(
            "invalid environment name {name:?} (use letters, digits, '-', '_' or '.')"
        )));
    }
    Ok(())
}

/// Parse, allocate, isolate and write `docker-compose.grove.yml`.
fn write_isolated_manifest(
    project: &Project,
    env: &Environment,
    compose_dir: &Path,
) -> Result<(ComposeManifest, Vec<Allocation>)> {
    let mut manifest = ComposeManifest::parse(compose_dir)?;
    let allocations = manifest_allocations(env, &manifest)?;
    manifest.apply_isolation(&project.name, &env.name, &allocations)?;
    manifest.write(&manifest.isolated_path())?;
    Ok((manifest, allocations))
}

/// Unknown services are rejected when the manifest is readable.
fn check_service(compose_dir: &Path, service: &str) -> Result<()> {
    if let Ok(manifest) = ComposeManifest::parse(compose_dir) {
        if !manifest.service_names().iter().any(|s| s == service) {
            return Err(Error::not_found("service", service));
        }
    }
    Ok(())
}

fn manifest_allocations(env: &Environment, manifest: &ComposeManifest) -> Result<Vec<Allocation>> {
    allocate(env.id, &manifest.service_ports()?)
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// `dir` if it exists, else `fallback`; compose commands scoped by `-p` do
/// not need the manifest directory.
fn existing_dir(dir: &Path, fallback: &Path) -> PathBuf {
    if dir.is_dir() {
        dir.to_path_buf()
    } else {
        fallback.to_path_buf()
    }
}

#[cfg(test)]
mod tests;
