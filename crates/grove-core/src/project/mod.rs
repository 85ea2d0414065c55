//! Project initialization and lookup.
//!
//! A project is a git repository registered with grove. Initialization
//! records where its compose manifest lives and creates the `.grove/`
//! control directory.

use crate::compose::detect_compose_file;
use crate::db::{Database, NewProject, Project, CONTROL_DIR};
use crate::error::{Error, Result};
use crate::worktree;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Options for [`init_project`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Display name; defaults to the repository directory name.
    pub name: Option<String>,
    /// Directory holding the compose manifest, relative to the repository root.
    pub compose_dir: Option<String>,
}

/// Register the git repository containing `path` as a project.
pub fn init_project(db: &Database, path: &Path, opts: InitOptions) -> Result<Project> {
    if !worktree::is_git_repo(path) {
        return Err(Error::NotGitRepo(path.to_string_lossy().to_string()));
    }
    let root = worktree::get_repo_root(path)?
        .ok_or_else(|| Error::NotGitRepo(path.to_string_lossy().to_string()))?
        .canonicalize()?;

    let compose_dir = opts
        .compose_dir
        .map(|d| d.trim_matches('/').to_string())
        .unwrap_or_default();
    let search_dir = if compose_dir.is_empty() {
        root.clone()
    } else {
        let dir = root.join(&compose_dir);
        if !dir.is_dir() {
            return Err(Error::ConfigInvalid(format!(
                "compose directory does not exist: {compose_dir}"
            )));
        }
        dir
    };

    let compose_file = detect_compose_file(&search_dir).unwrap_or_default();
    if compose_file.is_empty() {
        info!("No compose file found in {:?}, environments will use simple mode", search_dir);
    }

    if db.project_exists_by_path(&root)? {
        return Err(Error::ConfigInvalid(format!(
            "already initialized: {}",
            root.display()
        )));
    }

    let name = match opts.name {
        Some(name) => name,
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::ConfigInvalid("cannot derive a project name".into()))?,
    };

    let control_dir = root.join(CONTROL_DIR);
    let created_control_dir = !control_dir.exists();
    fs::create_dir_all(&control_dir)?;

    let project = match db.insert_project(&NewProject {
        name,
        root_path: root.clone(),
        compose_file: compose_file.to_string(),
        compose_dir,
    }) {
        Ok(p) => p,
        Err(e) => {
            if created_control_dir {
                let _ = fs::remove_dir_all(&control_dir);
            }
            return Err(e);
        }
    };

    if let Err(e) = update_gitignore(&root) {
        warn!("Could not update .gitignore: {}", e);
    }

    info!("Initialized project {} at {:?}", project.name, project.root_path);
    Ok(project)
}

/// Append `.grove/` to the repository's `.gitignore` unless already ignored.
pub fn update_gitignore(root: &Path) -> Result<bool> {
    let path = root.join(".gitignore");
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let entry = format!("{CONTROL_DIR}/");
    if content
        .lines()
        .map(str::trim)
        .any(|l| l == entry || l == CONTROL_DIR || l == format!("/{entry}"))
    {
        return Ok(false);
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if !content.is_empty() && !content.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "{entry}")?;
    Ok(true)
}

/// Resolve a project by name, or by the directory it contains.
pub fn find_project(db: &Database, name: Option<&str>, cwd: &Path) -> Result<Project> {
    match name {
        Some(name) => db
            .get_project_by_name(name)?
            .ok_or_else(|| Error::not_found("project", name)),
        None => {
            let dir = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
            db.find_project_by_path(&dir)?
                .ok_or_else(|| Error::not_found("project", dir.to_string_lossy()))
        }
    }
}

/// Unregister a project. Refuses while environments are still recorded,
/// since their worktrees and containers would be orphaned.
pub fn remove_project(db: &Database, project: &Project) -> Result<()> {
    let envs = db.list_environments(project.id)?;
    if !envs.is_empty() {
        let names: Vec<_> = envs.iter().map(|e| e.name.as_str()).collect();
        return Err(Error::ConfigInvalid(format!(
            "project {} still has environments: {}",
            project.name,
            names.join(", ")
        )));
    }
    db.delete_project(&project.root_path)
}
