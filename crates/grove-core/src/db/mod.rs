//! Registry of projects and environments, backed by SQLite.
//!
//! The registry is the sole source of truth for which environments exist.
//!
//! Database location priority:
//! 1. Explicit path (per-project `.grove/state.db` or a caller-supplied file)
//! 2. GROVE_STATE_DB env var
//! 3. ~/.grove/state.db
//!
//! All access goes through one connection behind a `Mutex`, so concurrent
//! callers queue instead of interleaving writes. Reads are serialized too;
//! WAL mode is enabled so other processes can still read while one writes.

pub mod types;

pub use types::*;

use crate::error::{Error, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    root_path TEXT UNIQUE NOT NULL,
    compose_file TEXT NOT NULL DEFAULT '',
    compose_dir TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS environments (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    branch TEXT NOT NULL,
    path TEXT NOT NULL,
    container_project TEXT NOT NULL DEFAULT '',
    session_name TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    UNIQUE(project_id, name)
);
";

const PROJECT_COLUMNS: &str = "id, name, root_path, compose_file, compose_dir, created_at";
const ENVIRONMENT_COLUMNS: &str =
    "id, project_id, name, branch, path, container_project, session_name, created_at";

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the central registry, creating `~/.grove` if needed.
    pub fn open_central() -> Result<Self> {
        Self::open_path(&Self::central_path()?)
    }

    /// Open database at specific path, creating the schema if missing
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Self::with_connection(conn)
    }

    /// In-memory registry (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Resolve the central registry location.
    pub fn central_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("GROVE_STATE_DB") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::ConfigInvalid("cannot determine home directory".into()))?;
        Ok(home.join(CONTROL_DIR).join("state.db"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Project Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a project. A root path identifies at most one project.
    pub fn insert_project(&self, project: &NewProject) -> Result<Project> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp_millis();
        let root = project.root_path.to_string_lossy();

        let inserted = conn.execute(
            "INSERT INTO projects (name, root_path, compose_file, compose_dir, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.name,
                root,
                project.compose_file,
                project.compose_dir,
                now
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::ConfigInvalid(format!(
                    "a project is already registered at {root}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        debug!("Registered project {} (id {}) at {}", project.name, id, root);
        Ok(Project {
            id,
            name: project.name.clone(),
            root_path: project.root_path.clone(),
            compose_file: project.compose_file.clone(),
            compose_dir: project.compose_dir.clone(),
            created_at: now,
        })
    }

    /// Get project by ID
    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id], Self::map_project)
            .optional()?)
    }

    /// Get project by its exact root path
    pub fn get_project_by_path(&self, root_path: &Path) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE root_path = ?1");
        Ok(conn
            .query_row(&sql, params![root_path.to_string_lossy()], Self::map_project)
            .optional()?)
    }

    /// Find the project containing `path`, walking up the directory tree.
    pub fn find_project_by_path(&self, path: &Path) -> Result<Option<Project>> {
        let mut current = Some(path);
        while let Some(dir) = current {
            if let Some(project) = self.get_project_by_path(dir)? {
                return Ok(Some(project));
            }
            current = dir.parent();
        }
        Ok(None)
    }

    /// Get project by name (case-insensitive). Returns the oldest on collision.
    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![name], Self::map_project)
            .optional()?)
    }

    /// List all projects ordered by name
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name ASC, id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let projects = stmt
            .query_map([], Self::map_project)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    pub fn project_exists_by_path(&self, root_path: &Path) -> Result<bool> {
        let conn = self.lock()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE root_path = ?1",
            params![root_path.to_string_lossy()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete a project (and, by cascade, its environment rows).
    pub fn delete_project(&self, root_path: &Path) -> Result<()> {
        let conn = self.lock()?;
        let root = root_path.to_string_lossy();
        let rows = conn.execute("DELETE FROM projects WHERE root_path = ?1", params![root])?;
        if rows == 0 {
            return Err(Error::not_found("project", root));
        }
        Ok(())
    }

    pub fn delete_project_by_name(&self, name: &str) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM projects WHERE LOWER(name) = LOWER(?1)",
            params![name],
        )?;
        if rows == 0 {
            return Err(Error::not_found("project", name));
        }
        Ok(())
    }

    fn map_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            root_path: PathBuf::from(row.get::<_, String>(2)?),
            compose_file: row.get(3)?,
            compose_dir: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Environment Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an environment in a single INSERT.
    ///
    /// A duplicate `(project_id, name)` surfaces as [`Error::AlreadyExists`],
    /// so two racing creates fail the same way as a sequential duplicate.
    pub fn insert_environment(&self, env: &NewEnvironment) -> Result<Environment> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp_millis();

        let inserted = conn.execute(
            "INSERT INTO environments
             (project_id, name, branch, path, container_project, session_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                env.project_id,
                env.name,
                env.branch,
                env.path.to_string_lossy(),
                env.container_project,
                env.session_name,
                now,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                let project: String = conn
                    .query_row(
                        "SELECT name FROM projects WHERE id = ?1",
                        params![env.project_id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .unwrap_or_else(|| env.project_id.to_string());
                return Err(Error::AlreadyExists {
                    project,
                    name: env.name.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Environment {
            id: conn.last_insert_rowid(),
            project_id: env.project_id,
            name: env.name.clone(),
            branch: env.branch.clone(),
            path: env.path.clone(),
            container_project: env.container_project.clone(),
            session_name: env.session_name.clone(),
            created_at: now,
        })
    }

    /// Get environment by name within a project
    pub fn get_environment(&self, project_id: i64, name: &str) -> Result<Option<Environment>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {ENVIRONMENT_COLUMNS} FROM environments WHERE project_id = ?1 AND name = ?2"
        );
        Ok(conn
            .query_row(&sql, params![project_id, name], Self::map_environment)
            .optional()?)
    }

    /// Get environment by ID
    pub fn get_environment_by_id(&self, id: i64) -> Result<Option<Environment>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ENVIRONMENT_COLUMNS} FROM environments WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id], Self::map_environment)
            .optional()?)
    }

    /// List environments of a project, newest first
    pub fn list_environments(&self, project_id: i64) -> Result<Vec<Environment>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {ENVIRONMENT_COLUMNS} FROM environments
             WHERE project_id = ?1 ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let envs = stmt
            .query_map(params![project_id], Self::map_environment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(envs)
    }

    pub fn environment_exists(&self, project_id: i64, name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM environments WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Find environments with this name in any project, paired with their project.
    pub fn find_environments_by_name(&self, name: &str) -> Result<Vec<(Project, Environment)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, p.root_path, p.compose_file, p.compose_dir, p.created_at,
                    e.id, e.project_id, e.name, e.branch, e.path, e.container_project,
                    e.session_name, e.created_at
             FROM environments e
             JOIN projects p ON p.id = e.project_id
             WHERE e.name = ?1
             ORDER BY p.name ASC, p.id ASC",
        )?;
        let matches = stmt
            .query_map(params![name], |row| {
                let project = Self::map_project(row)?;
                let env = Environment {
                    id: row.get(6)?,
                    project_id: row.get(7)?,
                    name: row.get(8)?,
                    branch: row.get(9)?,
                    path: PathBuf::from(row.get::<_, String>(10)?),
                    container_project: row.get(11)?,
                    session_name: row.get(12)?,
                    created_at: row.get(13)?,
                };
                Ok((project, env))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    /// Delete an environment row. A missing row is [`Error::NotFound`].
    pub fn delete_environment(&self, project_id: i64, name: &str) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM environments WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
        )?;
        if rows == 0 {
            return Err(Error::not_found("environment", name));
        }
        debug!("Deleted environment row {} (project {})", name, project_id);
        Ok(())
    }

    fn map_environment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Environment> {
        Ok(Environment {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            branch: row.get(3)?,
            path: PathBuf::from(row.get::<_, String>(4)?),
            container_project: row.get(5)?,
            session_name: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn new_project(db: &Database, name: &str, root: &str) -> Project {
        db.insert_project(&NewProject {
            name: name.to_string(),
            root_path: PathBuf::from(root),
            compose_file: String::new(),
            compose_dir: String::new(),
        })
        .unwrap()
    }

    fn new_env(project: &Project, name: &str) -> NewEnvironment {
        NewEnvironment {
            project_id: project.id,
            name: name.to_string(),
            branch: name.to_string(),
            path: project.worktrees_dir().join(name),
            container_project: format!("grove-{}-{}", project.name, name),
            session_name: format!("grove/{}/{}", project.name, name),
        }
    }

    #[test]
    fn test_project_roundtrip_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let p = new_project(&db, "Shop", "/src/shop");

        assert_eq!(db.get_project(p.id).unwrap(), Some(p.clone()));
        assert_eq!(
            db.get_project_by_path(Path::new("/src/shop")).unwrap(),
            Some(p.clone())
        );
        assert_eq!(db.get_project_by_name("shop").unwrap(), Some(p.clone()));
        assert!(db.project_exists_by_path(Path::new("/src/shop")).unwrap());
        assert!(db.get_project_by_name("other").unwrap().is_none());
    }

    #[test]
    fn test_find_project_walks_up() {
        let db = Database::open_in_memory().unwrap();
        let p = new_project(&db, "shop", "/src/shop");
        let found = db
            .find_project_by_path(Path::new("/src/shop/.grove/worktrees/feat/app"))
            .unwrap();
        assert_eq!(found.map(|f| f.id), Some(p.id));
        assert!(db.find_project_by_path(Path::new("/elsewhere")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_root_path_rejected() {
        let db = Database::open_in_memory().unwrap();
        new_project(&db, "shop", "/src/shop");
        let err = db
            .insert_project(&NewProject {
                name: "shop2".into(),
                root_path: PathBuf::from("/src/shop"),
                compose_file: String::new(),
                compose_dir: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn test_list_projects_sorted_by_name() {
        let db = Database::open_in_memory().unwrap();
        new_project(&db, "zeta", "/z");
        new_project(&db, "alpha", "/a");
        let names: Vec<_> = db
            .list_projects()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_delete_missing_project_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.delete_project(Path::new("/nope")).unwrap_err().is_not_found());
        assert!(db.delete_project_by_name("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_environment_insert_get_delete() {
        let db = Database::open_in_memory().unwrap();
        let p = new_project(&db, "shop", "/src/shop");
        let env = db.insert_environment(&new_env(&p, "feat")).unwrap();

        assert!(env.id > 0);
        assert!(db.environment_exists(p.id, "feat").unwrap());
        assert_eq!(db.get_environment(p.id, "feat").unwrap(), Some(env.clone()));
        assert_eq!(db.get_environment_by_id(env.id).unwrap(), Some(env.clone()));

        db.delete_environment(p.id, "feat").unwrap();
        assert!(!db.environment_exists(p.id, "feat").unwrap());
        assert!(db.delete_environment(p.id, "feat").unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_environment_is_already_exists() {
        let db = Database::open_in_memory().unwrap();
        let p = new_project(&db, "shop", "/src/shop");
        db.insert_environment(&new_env(&p, "feat")).unwrap();
        match db.insert_environment(&new_env(&p, "feat")).unwrap_err() {
            Error::AlreadyExists { project, name } => {
                assert_eq!(project, "shop");
                assert_eq!(name, "feat");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_environment_names_scoped_to_project() {
        let db = Database::open_in_memory().unwrap();
        let a = new_project(&db, "api", "/src/api");
        let w = new_project(&db, "web", "/src/web");
        db.insert_environment(&new_env(&a, "feat")).unwrap();
        db.insert_environment(&new_env(&w, "feat")).unwrap();
        db.insert_environment(&new_env(&w, "other")).unwrap();

        let found = db.find_environments_by_name("feat").unwrap();
        let labels: Vec<_> = found
            .iter()
            .map(|(p, e)| e.qualified_name(p))
            .collect();
        assert_eq!(labels, vec!["api/feat", "web/feat"]);
        assert_eq!(db.list_environments(w.id).unwrap().len(), 2);
    }

    #[test]
    fn test_deleting_project_cascades() {
        let db = Database::open_in_memory().unwrap();
        let p = new_project(&db, "shop", "/src/shop");
        let env = db.insert_environment(&new_env(&p, "feat")).unwrap();
        db.delete_project(Path::new("/src/shop")).unwrap();
        assert!(db.get_environment_by_id(env.id).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_inserts_of_same_name() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let p = new_project(&db, "shop", "/src/shop");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                let env = new_env(&p, "race");
                thread::spawn(move || db.insert_environment(&env))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(Error::AlreadyExists { .. })))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(dup, 7);
    }

    #[test]
    fn test_open_path_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        {
            let db = Database::open_path(&path).unwrap();
            new_project(&db, "shop", "/src/shop");
        }
        let db = Database::open_path(&path).unwrap();
        assert_eq!(db.list_projects().unwrap().len(), 1);
        db.ping().unwrap();
    }
}
