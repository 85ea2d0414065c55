//! grove - per-branch development environments
//!
//! Each environment pairs a git worktree with an isolated docker compose
//! stack and a tmux session, tracked in a SQLite registry.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};
use commands::create::CreateArgs;
use grove_core::docker::LogsOptions;

fn main() -> Result<()> {
    // Initialize tracing; RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("grove=info,grove_core=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Init {
            path,
            name,
            compose_dir,
        } => commands::init::execute(path, name, compose_dir, &config),
        Commands::Create {
            name,
            branch,
            project,
            no_session,
            attach,
        } => {
            let args = CreateArgs {
                name,
                branch,
                project,
                no_session,
                attach,
            };
            commands::create::execute(args, &config)
        }
        Commands::Destroy {
            target,
            volumes,
            delete_branch,
            project,
        } => commands::destroy::execute(&target, volumes, delete_branch, project.as_deref(), &config),
        Commands::Up { target, project } => {
            commands::stack::up(&target, project.as_deref(), &config)
        }
        Commands::Down { target, project } => {
            commands::stack::down(&target, project.as_deref(), &config)
        }
        Commands::Restart {
            target,
            service,
            project,
        } => commands::stack::restart(&target, service, project.as_deref(), &config),
        Commands::Logs {
            target,
            service,
            follow,
            tail,
            project,
        } => {
            let opts = LogsOptions {
                service,
                follow,
                tail,
            };
            commands::logs::execute(&target, opts, project.as_deref(), &config)
        }
        Commands::Exec {
            target,
            service,
            command,
            project,
        } => commands::exec::execute(&target, &service, &command, project.as_deref(), &config),
        Commands::Shell {
            target,
            service,
            project,
        } => commands::exec::shell(&target, &service, project.as_deref(), &config),
        Commands::List { all, project, json } => {
            commands::list::execute(all, project.as_deref(), json, &config)
        }
        Commands::Status {
            target,
            project,
            json,
        } => commands::status::execute(&target, project.as_deref(), json, &config),
        Commands::Env {
            target,
            project,
            json,
        } => commands::env::execute(&target, project.as_deref(), json, &config),
        Commands::Attach { target, project } => {
            commands::attach::execute(&target, project.as_deref(), &config)
        }
        Commands::Run { target, project } => {
            commands::run::execute(&target, project.as_deref(), &config)
        }
        Commands::Projects { remove } => {
            commands::projects::execute(remove.as_deref(), &config)
        }
        Commands::Doctor => commands::doctor::execute(&config),
        Commands::Version => {
            println!("grove {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
