//! Diagnostics command.

use anyhow::Result;
use colored::Colorize;
use grove_core::config::ProjectConfig;
use grove_core::docker::check_docker_available;
use grove_core::project;
use grove_core::tmux;

use super::cwd;
use crate::config::Config;

pub fn execute(config: &Config) -> Result<()> {
    println!("{}", "grove Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    // Check git
    print!("  git: ");
    match which::which("git") {
        Ok(_) => println!("{}", "✓ installed".green()),
        Err(_) => {
            println!("{}", "✗ not found".red());
            issues.push("git is not installed".to_string());
        }
    }

    // Check tmux
    print!("  tmux: ");
    match tmux::check_tmux() {
        Ok(_) => println!("{}", "✓ installed".green()),
        Err(_) => {
            println!("{}", "✗ not found".red());
            issues.push("tmux is not installed".to_string());
        }
    }

    // Check docker; only container-mode environments need it
    print!("  docker: ");
    match check_docker_available() {
        Ok(_) => println!("{}", "✓ daemon reachable".green()),
        Err(e) => {
            println!("{}", format!("○ {}", e).yellow());
        }
    }

    // Check config file
    print!("  Config file: ");
    let config_path = Config::config_path();
    if config_path.exists() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    // Check registry
    print!("  Registry: ");
    let db = match config.open_registry() {
        Ok(db) => match db.ping() {
            Ok(()) => {
                println!("{}", "✓ connected".green());
                Some(db)
            }
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push("Registry not accessible".to_string());
                None
            }
        },
        Err(e) => {
            println!("{}", format!("✗ {:#}", e).red());
            issues.push("Registry not accessible".to_string());
            None
        }
    };

    // Check the project containing the current directory
    if let Some(db) = db {
        let here = cwd()?;
        print!("  Project: ");
        match project::find_project(&db, None, &here) {
            Ok(project) => {
                println!("{}", format!("✓ {}", project.name).green());

                print!("  Project config: ");
                match ProjectConfig::load(&project.root_path) {
                    Ok(_) if ProjectConfig::path(&project.root_path).exists() => {
                        println!("{}", "✓ valid".green())
                    }
                    Ok(_) => println!("{}", "○ none".yellow()),
                    Err(e) => {
                        println!("{}", "✗ invalid".red());
                        issues.push(e.to_string());
                    }
                }

                let envs = db.list_environments(project.id)?;
                let missing: Vec<_> = envs.iter().filter(|e| !e.path.is_dir()).collect();
                println!("  Environments: {} registered", envs.len());
                for env in missing {
                    issues.push(format!(
                        "Worktree for {} is missing ({}); run `grove destroy {}`",
                        env.name,
                        env.path.display(),
                        env.qualified_name(&project)
                    ));
                }
            }
            Err(_) => println!("{}", "○ not inside a grove project".yellow()),
        }
    }

    // Summary
    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}
