//! Quarry CLI library, shared by the `quarry` binary and its integration tests.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, EnvAction};
use commands::Context;

/// Parse arguments, dispatch, and return the process exit code.
pub fn run_cli() -> Result<i32> {
    let cli = Cli::parse();
    quarry_core::observability::init_tracing();
    let mut ctx = Context::load(cli.directory.as_deref())?;

    match cli.command {
        Commands::Env { action } => match action {
            EnvAction::Use { python } => commands::env::cmd_use(&mut ctx, &python)?,
            EnvAction::Remove { python } => commands::env::cmd_remove(&mut ctx, &python)?,
            EnvAction::List { full_path } => commands::env::cmd_list(&ctx, full_path)?,
            EnvAction::Info { path } => commands::env::cmd_info(&ctx, path)?,
        },
        Commands::Shell => return commands::shell::cmd_shell(&mut ctx),
        Commands::Run { command } => return commands::run::cmd_run(&mut ctx, &command),
    }

    Ok(0)
}
