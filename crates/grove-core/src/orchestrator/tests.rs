use super::*;
use crate::config::Scripts;
use crate::db::NewProject;
use crate::docker::{LogsOptions, PortDiscovery};
use std::collections::HashSet;
use std::sync::Mutex;
use tempfile::TempDir;

const MANIFEST: &str = r#"
services:
  web:
    image: web
    ports:
      - "3000:3000"
  api:
    image: api
    ports:
      - "3000"
  db:
    image: postgres
volumes:
  pgdata:
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Recording fakes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn index_of(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with {prefix:?} in {:?}", self.calls()))
    }

    fn any(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

fn boom(what: &str) -> Error {
    Error::command_failed(what, "boom")
}

struct FakeWorktrees {
    rec: Recorder,
    manifest: Option<String>,
    fail_remove: bool,
    /// Registers an environment of the same name while git is busy, the way
    /// a concurrent `grove create` would.
    racer: Option<(Arc<Database>, i64)>,
}

impl WorktreeProvisioner for FakeWorktrees {
    fn provision(
        &self,
        _repo_root: &Path,
        name: &str,
        base_path: &Path,
        _base_branch: Option<&str>,
    ) -> Result<WorktreeInfo> {
        self.rec.push(format!("worktree.provision {name}"));
        let path = base_path.join(name);
        fs::create_dir_all(&path)?;
        if let Some(ref manifest) = self.manifest {
            fs::write(path.join("docker-compose.yml"), manifest)?;
        }
        if let Some((ref db, project_id)) = self.racer {
            db.insert_environment(&NewEnvironment {
                project_id,
                name: name.to_string(),
                branch: format!("{name}-racer"),
                path: base_path.join("racer"),
                container_project: String::new(),
                session_name: String::new(),
            })?;
        }
        Ok(WorktreeInfo {
            path,
            branch: name.to_string(),
        })
    }

    fn remove(&self, _repo_root: &Path, path: &Path) -> Result<()> {
        self.rec.push("worktree.remove");
        if self.fail_remove {
            return Err(boom("git worktree remove"));
        }
        remove_dir_if_exists(path)
    }

    fn delete_branch(&self, _repo_root: &Path, branch: &str) -> Result<bool> {
        self.rec.push(format!("worktree.delete_branch {branch}"));
        Ok(true)
    }
}

#[derive(Default)]
struct FakeContainers {
    rec: Recorder,
    fail_start: bool,
    fail_stop: bool,
    discovered: Option<PortDiscovery>,
}

impl ContainerRuntime for FakeContainers {
    fn status(&self, _dir: &Path, tag: &str, manifest: &str) -> ContainerStatus {
        assert_eq!(manifest, ISOLATED_MANIFEST);
        self.rec.push(format!("containers.status {tag}"));
        ContainerStatus::Running
    }

    fn start(&self, dir: &Path, tag: &str, manifest: &str) -> Result<()> {
        self.rec.push(format!("containers.start {tag} {manifest}"));
        assert!(dir.join(manifest).is_file(), "isolated manifest missing");
        if self.fail_start {
            return Err(boom("docker compose up"));
        }
        Ok(())
    }

    fn stop(&self, _dir: &Path, tag: &str, manifest: &str, remove_volumes: bool) -> Result<()> {
        assert_eq!(manifest, ISOLATED_MANIFEST);
        self.rec.push(format!("containers.stop {tag} volumes={remove_volumes}"));
        if self.fail_stop {
            return Err(boom("docker compose down"));
        }
        Ok(())
    }

    fn restart(
        &self,
        _dir: &Path,
        tag: &str,
        manifest: &str,
        service: Option<&str>,
    ) -> Result<()> {
        assert_eq!(manifest, ISOLATED_MANIFEST);
        self.rec
            .push(format!("containers.restart {tag} {}", service.unwrap_or("*")));
        Ok(())
    }

    fn discover_ports(&self, _dir: &Path, tag: &str, manifest: &str) -> Result<PortDiscovery> {
        assert_eq!(manifest, ISOLATED_MANIFEST);
        self.rec.push(format!("containers.discover {tag}"));
        Ok(self.discovered.clone().unwrap_or_default())
    }

    fn logs(&self, _dir: &Path, tag: &str, manifest: &str, opts: &LogsOptions) -> Result<()> {
        assert_eq!(manifest, ISOLATED_MANIFEST);
        self.rec.push(format!(
            "containers.logs {tag} {} follow={} tail={:?}",
            opts.service.as_deref().unwrap_or("*"),
            opts.follow,
            opts.tail
        ));
        Ok(())
    }

    fn exec(
        &self,
        _dir: &Path,
        tag: &str,
        manifest: &str,
        service: &str,
        command: &[String],
    ) -> Result<()> {
        assert_eq!(manifest, ISOLATED_MANIFEST);
        self.rec
            .push(format!("containers.exec {tag} {service} {}", command.join(" ")));
        Ok(())
    }
}

#[derive(Default)]
struct FakeSessions {
    rec: Recorder,
    live: Mutex<HashSet<String>>,
    fail_create: bool,
    layouts: Mutex<Vec<SessionLayout>>,
}

impl SessionManager for FakeSessions {
    fn create(&self, layout: &SessionLayout) -> Result<()> {
        self.rec.push(format!("sessions.create {}", layout.session_name));
        if self.fail_create {
            return Err(Error::Tmux("no server".into()));
        }
        self.live.lock().unwrap().insert(layout.session_name.clone());
        self.layouts.lock().unwrap().push(layout.clone());
        Ok(())
    }

    fn kill(&self, name: &str) -> Result<()> {
        self.rec.push(format!("sessions.kill {name}"));
        self.live.lock().unwrap().remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.live.lock().unwrap().contains(name)
    }
}

#[derive(Default)]
struct FakeScripts {
    rec: Recorder,
    fail_on: Option<String>,
    envs: Mutex<Vec<Vec<(String, String)>>>,
}

impl ScriptRunner for FakeScripts {
    fn run(&self, script: &str, _dir: &Path, env: &[(String, String)]) -> Result<()> {
        self.rec.push(format!("script {script}"));
        self.envs.lock().unwrap().push(env.to_vec());
        if self.fail_on.as_deref() == Some(script) {
            return Err(boom(script));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    rec: Recorder,
    project: Project,
    sessions: Arc<FakeSessions>,
    scripts: Arc<FakeScripts>,
    orch: Orchestrator,
}

#[derive(Default)]
struct Setup {
    manifest: Option<&'static str>,
    fail_start: bool,
    fail_stop: bool,
    fail_remove: bool,
    fail_session: bool,
    fail_script: Option<&'static str>,
    discovered: Option<PortDiscovery>,
    race: bool,
}

impl Harness {
    fn new(setup: Setup) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::default();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let project = db
            .insert_project(&NewProject {
                name: "shop".into(),
                root_path: dir.path().to_path_buf(),
                compose_file: String::new(),
                compose_dir: String::new(),
            })
            .unwrap();

        let sessions = Arc::new(FakeSessions {
            rec: rec.clone(),
            fail_create: setup.fail_session,
            ..Default::default()
        });
        let scripts = Arc::new(FakeScripts {
            rec: rec.clone(),
            fail_on: setup.fail_script.map(str::to_string),
            ..Default::default()
        });
        let tools = Toolchain {
            worktrees: Arc::new(FakeWorktrees {
                rec: rec.clone(),
                manifest: setup.manifest.map(str::to_string),
                fail_remove: setup.fail_remove,
                racer: setup.race.then(|| (db.clone(), project.id)),
            }),
            containers: Arc::new(FakeContainers {
                rec: rec.clone(),
                fail_start: setup.fail_start,
                fail_stop: setup.fail_stop,
                discovered: setup.discovered,
            }),
            sessions: sessions.clone(),
            scripts: scripts.clone(),
        };

        Self {
            _dir: dir,
            rec,
            project,
            sessions,
            scripts,
            orch: Orchestrator::new(db, tools),
        }
    }

    fn container() -> Self {
        Self::new(Setup {
            manifest: Some(MANIFEST),
            ..Default::default()
        })
    }

    fn simple() -> Self {
        Self::new(Setup::default())
    }

    fn create(&self, name: &str) -> Result<CreateOutcome> {
        self.orch.create(&self.project, CreateOptions::new(name))
    }

    fn with_scripts(&self, name: &str, scripts: Scripts) -> Result<CreateOutcome> {
        let mut opts = CreateOptions::new(name);
        opts.config.scripts = scripts;
        self.orch.create(&self.project, opts)
    }

    fn worktree(&self, name: &str) -> PathBuf {
        self.project.worktrees_dir().join(name)
    }

    fn env_count(&self) -> usize {
        self.orch.db().list_environments(self.project.id).unwrap().len()
    }

    /// Registry row, worktree and data dir are all gone.
    fn assert_absent(&self, name: &str) {
        assert!(self
            .orch
            .db()
            .get_environment(self.project.id, name)
            .unwrap()
            .is_none());
        assert!(!self.worktree(name).exists(), "worktree left behind");
        assert!(!self.project.data_dir(name).exists(), "data dir left behind");
    }
}

fn setup_scripts() -> Scripts {
    Scripts {
        prepare: Some("prepare".into()),
        setup: Some("setup".into()),
        run: None,
        destroy: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Create
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_create_container_mode() {
    let h = Harness::container();
    let out = h.create("feat-a").unwrap();

    assert_eq!(out.mode, Mode::Container);
    assert_eq!(out.environment.container_project, "grove-shop-feat-a");
    assert_eq!(out.environment.session_name, "grove/shop/feat-a");
    assert!(out.data_dir.is_dir());
    assert!(h.worktree("feat-a").join(ISOLATED_MANIFEST).is_file());
    assert!(h.rec.any("containers.start grove-shop-feat-a docker-compose.grove.yml"));

    let layouts = h.sessions.layouts.lock().unwrap();
    assert_eq!(layouts[0].services, vec!["web", "api", "db"]);
    assert_eq!(layouts[0].container_project.as_deref(), Some("grove-shop-feat-a"));
    assert_eq!(
        layouts[0].manifest.as_deref(),
        Some(h.worktree("feat-a").join(ISOLATED_MANIFEST).as_path())
    );
    assert!(layouts[0].manifest.as_ref().unwrap().is_absolute());
}

#[test]
fn test_first_environment_allocations_are_sorted_and_disjoint() {
    let h = Harness::container();
    let out = h.create("feat-a").unwrap();
    assert_eq!(out.environment.id, 1);
    assert_eq!(
        out.allocations,
        vec![
            Allocation { service: "api".into(), container_port: 3000, host_port: 10100 },
            Allocation { service: "web".into(), container_port: 3000, host_port: 10101 },
        ]
    );
}

#[test]
fn test_scripts_bracket_container_start() {
    let h = Harness::container();
    h.with_scripts("feat-a", setup_scripts()).unwrap();

    let prepare = h.rec.index_of("script prepare");
    let start = h.rec.index_of("containers.start");
    let setup = h.rec.index_of("script setup");
    let session = h.rec.index_of("sessions.create");
    assert!(prepare < start && start < setup && setup < session);

    let envs = h.scripts.envs.lock().unwrap();
    let vars: std::collections::BTreeMap<_, _> = envs[0].iter().cloned().collect();
    assert_eq!(vars["GROVE_ENV_NAME"], "feat-a");
    assert_eq!(vars["GROVE_WEB_PORT"], "10101");
    assert_eq!(vars["GROVE_API_PORT"], "10100");
}

#[test]
fn test_duplicate_name_is_rejected_without_mutation() {
    let h = Harness::container();
    h.create("feat-a").unwrap();
    h.rec.clear();

    let err = h.create("feat-a").unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { ref name, .. } if name == "feat-a"));
    assert!(h.rec.calls().is_empty(), "unexpected calls: {:?}", h.rec.calls());
    assert_eq!(h.env_count(), 1);
}

#[test]
fn test_create_race_loser_unwinds_and_keeps_winner() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        race: true,
        ..Default::default()
    });
    let err = h.create("feat-a").unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { ref name, .. } if name == "feat-a"));

    assert!(h.rec.any("worktree.remove"));
    assert!(!h.rec.any("containers."));
    assert!(!h.worktree("feat-a").exists(), "worktree left behind");
    assert!(!h.project.data_dir("feat-a").exists(), "data dir left behind");

    let winner = h
        .orch
        .db()
        .get_environment(h.project.id, "feat-a")
        .unwrap()
        .expect("racing environment was deleted");
    assert_eq!(winner.branch, "feat-a-racer");
    assert_eq!(winner.path, h.project.worktrees_dir().join("racer"));
}

#[test]
fn test_invalid_name_is_rejected_before_provisioning() {
    let h = Harness::simple();
    for name in ["", "a/b", "-x", ".hidden", "x..y", "name.lock", "sp ace"] {
        assert!(matches!(h.create(name), Err(Error::ConfigInvalid(_))), "{name:?}");
    }
    assert!(h.rec.calls().is_empty());
}

#[test]
fn test_failed_setup_script_unwinds_in_reverse() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        fail_script: Some("setup"),
        ..Default::default()
    });
    let err = h.with_scripts("feat-a", setup_scripts()).unwrap_err();
    assert!(matches!(err, Error::CommandFailed { ref cmd, .. } if cmd == "setup"));

    let stop = h.rec.index_of("containers.stop grove-shop-feat-a volumes=true");
    let remove = h.rec.index_of("worktree.remove");
    assert!(stop < remove);
    assert!(!h.rec.any("sessions.create"));
    h.assert_absent("feat-a");
}

#[test]
fn test_failed_start_still_stops_partial_stack() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        fail_start: true,
        ..Default::default()
    });
    let err = h.create("feat-a").unwrap_err();
    assert!(err.is_external_tool_failure());
    assert!(h.rec.any("containers.stop"));
    h.assert_absent("feat-a");
}

#[test]
fn test_failed_prepare_never_starts_containers() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        fail_script: Some("prepare"),
        ..Default::default()
    });
    h.with_scripts("feat-a", setup_scripts()).unwrap_err();
    assert!(!h.rec.any("containers.start"));
    assert!(!h.rec.any("containers.stop"));
    h.assert_absent("feat-a");
}

#[test]
fn test_session_failure_triggers_compensation() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        fail_session: true,
        ..Default::default()
    });
    let err = h.create("feat-a").unwrap_err();
    assert!(matches!(err, Error::Tmux(_)));
    h.assert_absent("feat-a");
}

#[test]
fn test_compensation_failure_does_not_mask_original_error() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        fail_session: true,
        fail_stop: true,
        ..Default::default()
    });
    let err = h.create("feat-a").unwrap_err();
    assert!(matches!(err, Error::Tmux(_)), "got {err:?}");
    // Remaining steps still ran after the failed container stop.
    assert!(h.orch.db().get_environment(h.project.id, "feat-a").unwrap().is_none());
    assert!(!h.worktree("feat-a").exists());
}

#[test]
fn test_malformed_manifest_unwinds() {
    let h = Harness::new(Setup {
        manifest: Some("services:\n  web:\n    ports: 3000\n"),
        ..Default::default()
    });
    let err = h.create("feat-a").unwrap_err();
    assert!(matches!(err, Error::ConfigInvalid(_)));
    assert!(!h.rec.any("containers."));
    h.assert_absent("feat-a");
}

#[test]
fn test_create_without_session() {
    let h = Harness::container();
    let mut opts = CreateOptions::new("feat-a");
    opts.session = false;
    h.orch.create(&h.project, opts).unwrap();
    assert!(!h.rec.any("sessions.create"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Simple mode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_simple_mode_never_touches_containers() {
    let h = Harness::simple();
    let out = h.create("plain").unwrap();
    assert_eq!(out.mode, Mode::Simple);
    assert!(out.environment.container_project.is_empty());
    assert!(out.allocations.is_empty());

    assert!(h.orch.up(&h.project, "plain").unwrap().is_simple_mode());
    assert!(h.orch.down(&h.project, "plain").unwrap().is_simple_mode());
    assert!(h
        .orch
        .restart(&h.project, "plain", RestartOptions::default())
        .unwrap()
        .is_simple_mode());

    let status = h.orch.status(&h.project, &out.environment);
    assert_eq!(status.mode, Mode::Simple);
    assert_eq!(status.containers, None);
    assert!(status.session);
    assert!(status.worktree);

    assert!(h.orch.allocations_for(&h.project, &out.environment).unwrap().is_empty());
    h.orch.destroy(&h.project, "plain", DestroyOptions::default()).unwrap();

    assert!(!h.rec.any("containers."), "calls: {:?}", h.rec.calls());
    let layouts = h.sessions.layouts.lock().unwrap();
    assert_eq!(layouts[0].container_project, None);
    assert!(layouts[0].services.is_empty());
}

#[test]
fn test_manifest_added_later_does_not_change_mode() {
    let h = Harness::simple();
    h.create("plain").unwrap();
    fs::write(h.worktree("plain").join("compose.yml"), MANIFEST).unwrap();
    assert!(h.orch.up(&h.project, "plain").unwrap().is_simple_mode());
    assert!(!h.rec.any("containers."));
}

// ─────────────────────────────────────────────────────────────────────────────
// Destroy
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_create_then_destroy_restores_registry() {
    let h = Harness::container();
    h.create("feat-a").unwrap();
    let report = h
        .orch
        .destroy(&h.project, "feat-a", DestroyOptions::default())
        .unwrap();

    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(h.env_count(), 0);
    h.assert_absent("feat-a");
    assert!(h.rec.any("sessions.kill grove/shop/feat-a"));
    assert!(h.rec.any("containers.stop grove-shop-feat-a volumes=false"));
}

#[test]
fn test_destroy_missing_environment_touches_nothing() {
    let h = Harness::container();
    let err = h
        .orch
        .destroy(&h.project, "env-a", DestroyOptions::default())
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(h.rec.calls().is_empty());
    assert!(!h.project.worktrees_dir().exists());
}

#[test]
fn test_destroy_is_best_effort() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        fail_stop: true,
        fail_remove: true,
        ..Default::default()
    });
    h.create("feat-a").unwrap();
    fs::remove_dir_all(h.worktree("feat-a")).unwrap();

    let mut opts = DestroyOptions {
        remove_volumes: true,
        delete_branch: true,
        ..Default::default()
    };
    opts.config.scripts.destroy = Some("teardown".into());
    let report = h.orch.destroy(&h.project, "feat-a", opts).unwrap();

    let steps: Vec<_> = report.warnings.iter().map(|w| w.step).collect();
    assert_eq!(steps, vec!["destroy script", "stop containers", "remove worktree"]);
    assert!(h.rec.any("containers.stop grove-shop-feat-a volumes=true"));
    assert!(h.rec.any("worktree.delete_branch feat-a"));
    assert!(!h.rec.any("script teardown"));
    assert_eq!(h.env_count(), 0);
}

#[test]
fn test_destroy_script_failure_is_a_warning() {
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        fail_script: Some("teardown"),
        ..Default::default()
    });
    h.create("feat-a").unwrap();
    let mut opts = DestroyOptions::default();
    opts.config.scripts.destroy = Some("teardown".into());

    let report = h.orch.destroy(&h.project, "feat-a", opts).unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].step, "destroy script");
    assert!(h.rec.index_of("script teardown") < h.rec.index_of("sessions.kill"));
    h.assert_absent("feat-a");
}

// ─────────────────────────────────────────────────────────────────────────────
// Up / down / restart / status
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_up_reallocates_identically() {
    let h = Harness::container();
    let created = h.create("feat-a").unwrap();
    let manifest = h.worktree("feat-a").join(ISOLATED_MANIFEST);
    fs::remove_file(&manifest).unwrap();
    h.rec.clear();

    match h.orch.up(&h.project, "feat-a").unwrap() {
        StackOutcome::Applied(allocations) => assert_eq!(allocations, created.allocations),
        StackOutcome::SimpleMode => panic!("expected container mode"),
    }
    assert!(manifest.is_file());
    assert_eq!(
        h.rec.calls(),
        vec!["containers.start grove-shop-feat-a docker-compose.grove.yml"]
    );
}

#[test]
fn test_down_and_restart() {
    let h = Harness::container();
    h.create("feat-a").unwrap();
    h.rec.clear();

    h.orch.down(&h.project, "feat-a").unwrap();
    h.orch
        .restart(&h.project, "feat-a", RestartOptions::default())
        .unwrap();
    h.orch
        .restart(
            &h.project,
            "feat-a",
            RestartOptions {
                service: Some("web".into()),
            },
        )
        .unwrap();
    assert_eq!(
        h.rec.calls(),
        vec![
            "containers.stop grove-shop-feat-a volumes=false",
            "containers.restart grove-shop-feat-a *",
            "containers.restart grove-shop-feat-a web",
        ]
    );

    let err = h
        .orch
        .restart(
            &h.project,
            "feat-a",
            RestartOptions {
                service: Some("nope".into()),
            },
        )
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_logs_exec_and_shell() {
    let h = Harness::container();
    h.create("feat-a").unwrap();
    h.rec.clear();

    h.orch
        .logs(&h.project, "feat-a", LogsOptions::default())
        .unwrap();
    h.orch
        .logs(
            &h.project,
            "feat-a",
            LogsOptions {
                service: Some("web".into()),
                follow: true,
                tail: Some(20),
            },
        )
        .unwrap();
    h.orch
        .exec(&h.project, "feat-a", "db", &["psql".to_string(), "-l".to_string()])
        .unwrap();

    let mut config = ProjectConfig::default();
    h.orch.shell(&h.project, "feat-a", "web", &config).unwrap();
    config.shells.insert("db".into(), "psql -U postgres".into());
    h.orch.shell(&h.project, "feat-a", "db", &config).unwrap();

    assert_eq!(
        h.rec.calls(),
        vec![
            "containers.logs grove-shop-feat-a * follow=false tail=None",
            "containers.logs grove-shop-feat-a web follow=true tail=Some(20)",
            "containers.exec grove-shop-feat-a db psql -l",
            "containers.exec grove-shop-feat-a web sh",
            "containers.exec grove-shop-feat-a db psql -U postgres",
        ]
    );
}

#[test]
fn test_logs_and_exec_reject_unknown_service_and_empty_command() {
    let h = Harness::container();
    h.create("feat-a").unwrap();
    h.rec.clear();

    let opts = LogsOptions {
        service: Some("nope".into()),
        ..Default::default()
    };
    assert!(h.orch.logs(&h.project, "feat-a", opts).unwrap_err().is_not_found());
    assert!(h
        .orch
        .exec(&h.project, "feat-a", "nope", &["sh".to_string()])
        .unwrap_err()
        .is_not_found());
    assert!(matches!(
        h.orch.exec(&h.project, "feat-a", "web", &[]),
        Err(Error::ConfigInvalid(_))
    ));
    assert!(h.rec.calls().is_empty());
}

#[test]
fn test_logs_and_exec_are_noops_in_simple_mode() {
    let h = Harness::simple();
    h.create("plain").unwrap();
    assert!(h
        .orch
        .logs(&h.project, "plain", LogsOptions::default())
        .unwrap()
        .is_simple_mode());
    assert!(h
        .orch
        .exec(&h.project, "plain", "web", &["sh".to_string()])
        .unwrap()
        .is_simple_mode());
    assert!(h
        .orch
        .shell(&h.project, "plain", "web", &ProjectConfig::default())
        .unwrap()
        .is_simple_mode());
    assert!(!h.rec.any("containers."));
}

#[test]
fn test_stack_operations_on_missing_environment() {
    let h = Harness::container();
    assert!(h.orch.up(&h.project, "ghost").unwrap_err().is_not_found());
    assert!(h.orch.down(&h.project, "ghost").unwrap_err().is_not_found());
    assert!(h.rec.calls().is_empty());
}

#[test]
fn test_status_container_mode() {
    let h = Harness::container();
    let env = h.create("feat-a").unwrap().environment;
    let status = h.orch.status(&h.project, &env);
    assert_eq!(status.mode, Mode::Container);
    assert_eq!(status.containers, Some(ContainerStatus::Running));
    assert!(status.session);
}

#[test]
fn test_allocations_prefer_discovered_ports() {
    let discovered = PortDiscovery {
        allocations: vec![Allocation {
            service: "web".into(),
            container_port: 3000,
            host_port: 10155,
        }],
        containers: Vec::new(),
        running: 1,
        total: 1,
    };
    let h = Harness::new(Setup {
        manifest: Some(MANIFEST),
        discovered: Some(discovered.clone()),
        ..Default::default()
    });
    let env = h.create("feat-a").unwrap().environment;
    assert_eq!(
        h.orch.allocations_for(&h.project, &env).unwrap(),
        discovered.allocations
    );

    let vars = h.orch.env_vars(&h.project, &env).unwrap();
    assert_eq!(vars.ports["GROVE_WEB_PORT"], 10155);
}

#[test]
fn test_allocations_fall_back_to_formula() {
    let h = Harness::container();
    let created = h.create("feat-a").unwrap();
    assert_eq!(
        h.orch
            .allocations_for(&h.project, &created.environment)
            .unwrap(),
        created.allocations
    );
}

#[test]
fn test_run_script() {
    let h = Harness::simple();
    h.create("plain").unwrap();

    let mut config = ProjectConfig::default();
    assert!(matches!(
        h.orch.run_script(&h.project, "plain", &config),
        Err(Error::ConfigInvalid(_))
    ));

    config.scripts.run = Some("serve".into());
    h.orch.run_script(&h.project, "plain", &config).unwrap();
    assert!(h.rec.any("script serve"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_resolve() {
    let h = Harness::simple();
    h.create("feat").unwrap();
    h.create("solo").unwrap();

    let db = h.orch.db();
    let other = db
        .insert_project(&NewProject {
            name: "blog".into(),
            root_path: "/src/blog".into(),
            compose_file: String::new(),
            compose_dir: String::new(),
        })
        .unwrap();
    db.insert_environment(&NewEnvironment {
        project_id: other.id,
        name: "feat".into(),
        branch: "feat".into(),
        path: "/src/blog/.grove/worktrees/feat".into(),
        container_project: String::new(),
        session_name: "grove/blog/feat".into(),
    })
    .unwrap();

    let (project, env) = resolve(db, "solo").unwrap();
    assert_eq!((project.name.as_str(), env.name.as_str()), ("shop", "solo"));

    let (project, _) = resolve(db, "blog/feat").unwrap();
    assert_eq!(project.name, "blog");

    match resolve(db, "feat").unwrap_err() {
        Error::Ambiguous { candidates, .. } => {
            assert_eq!(candidates, vec!["blog/feat", "shop/feat"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(resolve(db, "nope").unwrap_err().is_not_found());
    assert!(resolve(db, "nope/feat").unwrap_err().is_not_found());
    assert!(resolve(db, "shop/nope").unwrap_err().is_not_found());
}
