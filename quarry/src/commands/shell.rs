//! `quarry shell`

use super::Context;
use anyhow::Result;
use quarry_core::config::env_keys::{external, QUARRY_ACTIVE};
use quarry_env::Shell;
use std::path::Path;

/// Spawn the user's shell inside the project's environment and return its
/// exit code once it ends.
pub fn cmd_shell(ctx: &mut Context) -> Result<i32> {
    let env = ctx.manager.create_venv(None, false)?;

    let already_active = ctx.vars.is_truthy(QUARRY_ACTIVE)
        || ctx.vars.get(external::VIRTUAL_ENV).map(Path::new) == Some(env.path());
    if already_active {
        println!(
            "Virtual environment already activated: {}",
            env.path().display()
        );
        return Ok(0);
    }

    println!("Spawning shell within {}", env.path().display());

    let mut vars = ctx.vars.clone();
    // Nested `quarry shell` calls see this and stop.
    vars.insert(QUARRY_ACTIVE, "1");
    let shell = Shell::detect(&ctx.vars)?;
    Ok(shell.activate(&env, &vars, &ctx.cwd)?)
}
