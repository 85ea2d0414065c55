//! Git worktree management.
//!
//! Each environment owns one worktree under `.grove/worktrees/<name>`,
//! checked out on a branch named after the environment.

use crate::error::{Error, Result};
use crate::process::{Cmd, GIT_TIMEOUT};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Worktree operations the orchestrator depends on.
pub trait WorktreeProvisioner: Send + Sync {
    /// Create `<base_path>/<name>` on a branch called `name`.
    ///
    /// With `base_branch` the new branch starts there; otherwise an existing
    /// branch called `name` is checked out, or a new one is cut from HEAD.
    fn provision(
        &self,
        repo_root: &Path,
        name: &str,
        base_path: &Path,
        base_branch: Option<&str>,
    ) -> Result<WorktreeInfo>;

    /// Remove a worktree. A path that no longer exists is not an error.
    fn remove(&self, repo_root: &Path, path: &Path) -> Result<()>;

    /// Delete a local branch. `Ok(false)` when it did not exist.
    fn delete_branch(&self, repo_root: &Path, branch: &str) -> Result<bool>;
}

/// [`WorktreeProvisioner`] backed by the git CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitWorktrees;

impl WorktreeProvisioner for GitWorktrees {
    fn provision(
        &self,
        repo_root: &Path,
        name: &str,
        base_path: &Path,
        base_branch: Option<&str>,
    ) -> Result<WorktreeInfo> {
        create_branch_with_worktree(repo_root, name, base_branch, &base_path.join(name))
    }

    fn remove(&self, repo_root: &Path, path: &Path) -> Result<()> {
        remove_worktree(repo_root, path)
    }

    fn delete_branch(&self, repo_root: &Path, branch: &str) -> Result<bool> {
        delete_branch(repo_root, branch)
    }
}

fn git(repo_path: &Path) -> Cmd {
    Cmd::new("git")
        .arg("-C")
        .arg(repo_path.to_string_lossy())
        .timeout(GIT_TIMEOUT)
}

/// Check if a directory is a git repository
pub fn is_git_repo(path: &Path) -> bool {
    git(path).args(["rev-parse", "--git-dir"]).succeeds()
}

/// Get the root directory of a git repository
pub fn get_repo_root(path: &Path) -> Result<Option<PathBuf>> {
    let output = git(path).args(["rev-parse", "--show-toplevel"]).output()?;
    if output.success() {
        Ok(Some(PathBuf::from(output.stdout.trim())))
    } else {
        Ok(None)
    }
}

/// Get the current branch name; `None` for a detached HEAD.
pub fn get_current_branch(path: &Path) -> Result<Option<String>> {
    let output = git(path).args(["rev-parse", "--abbrev-ref", "HEAD"]).output()?;
    if !output.success() {
        return Ok(None);
    }
    let branch = output.stdout.trim();
    if branch.is_empty() || branch == "HEAD" {
        Ok(None)
    } else {
        Ok(Some(branch.to_string()))
    }
}

pub fn branch_exists(repo_path: &Path, branch: &str) -> bool {
    git(repo_path)
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("refs/heads/{branch}"))
        .succeeds()
}

fn ref_exists(repo_path: &Path, reference: &str) -> bool {
    git(repo_path)
        .args(["rev-parse", "--verify", "--quiet", reference])
        .succeeds()
}

/// Create a worktree at `target_path` on branch `branch_name`.
pub fn create_branch_with_worktree(
    repo_path: &Path,
    branch_name: &str,
    base_branch: Option<&str>,
    target_path: &Path,
) -> Result<WorktreeInfo> {
    if !is_git_repo(repo_path) {
        return Err(Error::NotGitRepo(repo_path.to_string_lossy().to_string()));
    }
    if target_path.exists() {
        return Err(Error::Worktree(format!(
            "path already exists: {}",
            target_path.display()
        )));
    }
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut cmd = git(repo_path)
        .args(["worktree", "add"])
        .arg(target_path.to_string_lossy());

    match base_branch {
        Some(base) => {
            // Prefer a local branch, fall back to the remote-tracking ref.
            let start = if ref_exists(repo_path, base) {
                base.to_string()
            } else if ref_exists(repo_path, &format!("origin/{base}")) {
                format!("origin/{base}")
            } else {
                return Err(Error::Worktree(format!("base branch not found: {base}")));
            };
            cmd = cmd.args(["-b", branch_name]).arg(start);
        }
        None if branch_exists(repo_path, branch_name) => {
            debug!("Reusing existing branch {}", branch_name);
            cmd = cmd.arg(branch_name);
        }
        None => {
            cmd = cmd.args(["-b", branch_name]);
        }
    }

    let output = cmd.output()?;
    if !output.success() {
        let stderr = output.diagnostics();
        if stderr.contains("already checked out") || stderr.contains("is already used by worktree")
        {
            return Err(Error::Worktree(format!(
                "branch {branch_name} is checked out elsewhere"
            )));
        }
        return Err(Error::command_failed(cmd.display(), stderr));
    }

    info!("Created worktree {:?} on branch {}", target_path, branch_name);
    Ok(WorktreeInfo {
        path: target_path.to_path_buf(),
        branch: branch_name.to_string(),
    })
}

/// Force-remove a worktree and unregister it from git.
pub fn remove_worktree(repo_path: &Path, worktree_path: &Path) -> Result<()> {
    if !worktree_path.exists() {
        debug!("Worktree {:?} already gone, pruning", worktree_path);
        return prune_worktrees(repo_path);
    }

    let cmd = git(repo_path)
        .args(["worktree", "remove", "--force"])
        .arg(worktree_path.to_string_lossy());
    let output = cmd.output()?;
    if output.success() {
        info!("Removed worktree at {:?}", worktree_path);
        return Ok(());
    }

    let stderr = output.diagnostics();
    if stderr.contains("is not a working tree") {
        warn!(
            "Path {:?} is not a registered worktree, removing directory only",
            worktree_path
        );
        fs::remove_dir_all(worktree_path)?;
        return Ok(());
    }

    Err(Error::command_failed(cmd.display(), stderr))
}

/// Force-delete a local branch. `Ok(false)` when it does not exist.
pub fn delete_branch(repo_path: &Path, branch: &str) -> Result<bool> {
    if !branch_exists(repo_path, branch) {
        debug!("Branch {} not found in {:?}", branch, repo_path);
        return Ok(false);
    }
    git(repo_path).args(["branch", "-D", branch]).run()?;
    info!("Deleted branch {} from {:?}", branch, repo_path);
    Ok(true)
}

/// Prune stale worktree entries from git.
pub fn prune_worktrees(repo_path: &Path) -> Result<()> {
    git(repo_path).args(["worktree", "prune"]).run()?;
    debug!("Pruned stale worktree entries for {:?}", repo_path);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Information about a created worktree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}
