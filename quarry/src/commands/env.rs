//! `quarry env use|remove|list|info`

use super::Context;
use anyhow::Result;

/// `quarry env use <python>`; `system` drops the explicit selection.
pub fn cmd_use(ctx: &mut Context, python: &str) -> Result<()> {
    if python == "system" {
        ctx.manager.deactivate()?;
        return Ok(());
    }
    let env = ctx.manager.activate(python)?;
    println!("Using virtualenv: {}", env.path().display());
    Ok(())
}

/// `quarry env remove <python>`
pub fn cmd_remove(ctx: &mut Context, python: &str) -> Result<()> {
    let env = ctx.manager.remove(python)?;
    println!("Deleted virtualenv: {}", env.path().display());
    Ok(())
}

/// `quarry env list`
pub fn cmd_list(ctx: &Context, full_path: bool) -> Result<()> {
    let activated = ctx
        .manager
        .active_version()?
        .map(|version| ctx.manager.venv_path(&version));

    for env in ctx.manager.list()? {
        let name = if full_path {
            env.path().display().to_string()
        } else {
            env.path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        if activated.as_deref() == Some(env.path()) {
            println!("{} (Activated)", name);
        } else {
            println!("{}", name);
        }
    }
    Ok(())
}

/// `quarry env info`
pub fn cmd_info(ctx: &Context, path_only: bool) -> Result<()> {
    let env = ctx.manager.get()?;

    if path_only {
        if env.is_venv() {
            println!("{}", env.path().display());
        }
        return Ok(());
    }

    println!();
    println!("Virtualenv");
    if env.is_venv() {
        println!("Python:         {}", env.version()?.text());
        println!("Implementation: {}", env.python_implementation()?);
        println!("Path:           {}", env.path().display());
        println!(
            "Valid:          {}",
            if env.is_sane() { "True" } else { "False" }
        );
    } else {
        println!("Path:           NA");
    }

    println!();
    println!("System");
    println!("Platform: {}", env.platform());
    println!("OS:       {}", env.os_name());
    println!("Python:   {}", env.base().display());
    Ok(())
}
