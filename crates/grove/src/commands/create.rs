//! Environment creation command.

use anyhow::Result;
use colored::Colorize;
use grove_core::orchestrator::{CreateOptions, Mode};
use grove_core::tmux;

use super::{current_project, orchestrator, print_allocations, project_config};
use crate::config::Config;

pub struct CreateArgs {
    pub name: String,
    pub branch: Option<String>,
    pub project: Option<String>,
    pub no_session: bool,
    pub attach: bool,
}

pub fn execute(args: CreateArgs, config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let project = current_project(orch.db(), args.project.as_deref())?;
    let session = config.create.session && !args.no_session;

    let mut opts = CreateOptions::new(&args.name);
    opts.base_branch = args.branch;
    opts.config = project_config(&project)?;
    opts.session = session;

    println!(
        "{} {}/{}",
        "Creating environment".cyan(),
        project.name,
        args.name
    );
    let outcome = orch.create(&project, opts)?;
    let env = &outcome.environment;

    println!("{} Environment {} ready", "✓".green(), env.name.bold());
    println!("  Branch:   {}", env.branch);
    println!("  Worktree: {}", env.path.display());
    println!("  Data:     {}", outcome.data_dir.display());
    match outcome.mode {
        Mode::Container => println!("  Stack:    {}", env.container_project),
        Mode::Simple => println!("  Stack:    {}", "none (simple mode)".yellow()),
    }
    print_allocations(&outcome.allocations);
    if session {
        println!("  Session:  {}", env.session_name);
    }

    if session && (args.attach || config.create.attach) {
        tmux::attach_session(&env.session_name)?;
    }
    Ok(())
}
