//! Registered project listing and removal.

use anyhow::Result;
use colored::Colorize;
use grove_core::project;

use super::current_project;
use crate::config::Config;

pub fn execute(remove: Option<&str>, config: &Config) -> Result<()> {
    let db = config.open_registry()?;

    if let Some(name) = remove {
        let project = current_project(&db, Some(name))?;
        project::remove_project(&db, &project)?;
        println!("{} Unregistered {}", "✓".green(), project.name.bold());
        return Ok(());
    }

    let projects = db.list_projects()?;
    if projects.is_empty() {
        println!("No projects registered. Run `grove init` in a git repository.");
        return Ok(());
    }
    for project in projects {
        let count = db.list_environments(project.id)?.len();
        println!(
            "  {:<20} {:>3} env(s)  {}",
            project.name.bold(),
            count,
            project.root_path.display()
        );
    }
    Ok(())
}
