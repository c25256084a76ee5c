//! `quarry run <command> [args...]`

use super::Context;
use anyhow::{bail, Result};

/// Execute `command` inside the project's environment. On unix this replaces
/// the quarry process; elsewhere the exit code is passed through.
pub fn cmd_run(ctx: &mut Context, command: &[String]) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        bail!("No command given");
    };
    let env = ctx.manager.create_venv(None, false)?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    Ok(env.execute(program, &args)?)
}
