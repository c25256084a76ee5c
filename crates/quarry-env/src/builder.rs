//! Creating and deleting virtualenv directories.
//!
//! The heavy lifting is done by the interpreter's own `venv` module; this
//! module only decides which interpreter to ask and how.

use crate::error::{EnvError, Result};
use crate::probe;
use crate::process::{self, Invocation};
use std::path::{Path, PathBuf};

/// Creates and deletes environment directories.
pub trait SandboxBuilder {
    /// Create a virtualenv at `path`, using `executable` when given and the
    /// host interpreter otherwise.
    fn build(&self, path: &Path, executable: Option<&str>) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path).map_err(|e| EnvError::io("Failed to remove", path, e))
    }
}

/// [`SandboxBuilder`] that delegates to `venv` (or `virtualenv` on 2.7).
#[derive(Debug, Default, Clone, Copy)]
pub struct VenvBuilder;

impl SandboxBuilder for VenvBuilder {
    fn build(&self, path: &Path, executable: Option<&str>) -> Result<()> {
        let path_str = path.to_string_lossy().into_owned();
        match executable {
            Some(executable) => {
                // Run the creation script inside the requested interpreter.
                process::run(
                    &Invocation::capture(vec![executable.to_string(), "-".to_string()])
                        .with_input(probe::create_venv_script(&path_str)),
                )?;
            }
            None => {
                let python = which_python()?;
                process::run(&Invocation::capture(vec![
                    python.to_string_lossy().into_owned(),
                    "-m".to_string(),
                    "venv".to_string(),
                    path_str,
                ]))?;
            }
        }
        Ok(())
    }
}

fn which_python() -> Result<PathBuf> {
    ["python3", "python"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| EnvError::Spawn {
            command: "python3".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "python3 or python not found in PATH",
            ),
        })
}
