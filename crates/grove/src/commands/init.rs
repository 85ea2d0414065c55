//! Project initialization command.

use anyhow::Result;
use colored::Colorize;
use grove_core::project::{self, InitOptions};
use std::path::PathBuf;

use super::cwd;
use crate::config::Config;

pub fn execute(
    path: Option<PathBuf>,
    name: Option<String>,
    compose_dir: Option<String>,
    config: &Config,
) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => cwd()?,
    };
    let db = config.open_registry()?;
    let project = project::init_project(&db, &path, InitOptions { name, compose_dir })?;

    println!("{} Initialized {}", "✓".green(), project.name.bold());
    println!("  Root: {}", project.root_path.display());
    if project.compose_file.is_empty() {
        println!(
            "  Compose: {}",
            "none (environments run in simple mode)".yellow()
        );
    } else if project.compose_dir.is_empty() {
        println!("  Compose: {}", project.compose_file);
    } else {
        println!("  Compose: {}/{}", project.compose_dir, project.compose_file);
    }
    println!();
    println!("Create an environment with: grove create <name>");
    Ok(())
}
