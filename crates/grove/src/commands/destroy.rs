//! Environment teardown command.

use anyhow::Result;
use colored::Colorize;
use grove_core::orchestrator::DestroyOptions;

use super::{orchestrator, print_warning, project_config, resolve_target};
use crate::config::Config;

pub fn execute(
    target: &str,
    volumes: bool,
    delete_branch: bool,
    project: Option<&str>,
    config: &Config,
) -> Result<()> {
    let orch = orchestrator(config)?;
    let (project, env) = resolve_target(&orch, target, project)?;

    // A broken .grove.toml should not block teardown; run without hooks.
    let project_config = match project_config(&project) {
        Ok(c) => c,
        Err(e) => {
            print_warning(format!("{e:#}, skipping destroy script"));
            Default::default()
        }
    };

    println!(
        "{} {}",
        "Destroying environment".cyan(),
        env.qualified_name(&project)
    );
    let report = orch.destroy(
        &project,
        &env.name,
        DestroyOptions {
            remove_volumes: volumes || config.destroy.volumes,
            delete_branch: delete_branch || config.destroy.delete_branch,
            config: project_config,
        },
    )?;

    for warning in &report.warnings {
        print_warning(warning);
    }
    if report.warnings.is_empty() {
        println!("{} Destroyed {}", "✓".green(), env.name.bold());
    } else {
        println!(
            "{} Destroyed {} with {} warning(s)",
            "✓".green(),
            env.name.bold(),
            report.warnings.len()
        );
    }
    Ok(())
}
