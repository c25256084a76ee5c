//! Interactive shells inside an environment.

#[cfg(unix)]
mod pty;

use crate::error::{EnvError, Result};
use crate::runtime::Env;
use quarry_core::config::env_keys::external;
use quarry_core::config::EnvVars;
use std::fmt;
use std::path::{Path, PathBuf};

/// Shell names recognised when walking the process tree.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const KNOWN_SHELLS: &[&str] = &[
    "sh", "bash", "dash", "zsh", "fish", "csh", "tcsh", "ksh", "mksh", "xonsh", "nu", "pwsh",
    "powershell", "cmd",
];

/// Parent processes inspected before giving up.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    name: String,
    path: PathBuf,
}

impl Shell {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The user's shell: `$SHELL` (`%COMSPEC%` on Windows), else the nearest
    /// ancestor process that looks like a shell.
    pub fn detect(vars: &EnvVars) -> Result<Self> {
        let key = if cfg!(windows) {
            external::COMSPEC
        } else {
            external::SHELL
        };
        if let Some(path) = vars.non_empty(key) {
            return Ok(Self::from_path(PathBuf::from(path)));
        }
        detect_from_process_tree().ok_or(EnvError::ShellDetection)
    }

    fn from_path(path: PathBuf) -> Self {
        let name = shell_name(&path);
        Self { name, path }
    }

    /// `activate`, with the suffix this shell's syntax needs.
    pub fn activate_script(&self) -> &'static str {
        match self.name.as_str() {
            "fish" => "activate.fish",
            "csh" | "tcsh" => "activate.csh",
            _ => "activate",
        }
    }

    pub fn source_command(&self) -> &'static str {
        match self.name.as_str() {
            "fish" | "csh" | "tcsh" => "source",
            _ => ".",
        }
    }

    /// The line typed into the new shell to enter `env`.
    pub fn activation_line(&self, env: &Env) -> String {
        let script = env.path().join("bin").join(self.activate_script());
        format!("{} {}", self.source_command(), script.display())
    }

    /// Run an interactive shell inside `env` until it exits, returning its
    /// exit code.
    #[cfg(unix)]
    pub fn activate(&self, env: &Env, vars: &EnvVars, cwd: &Path) -> Result<i32> {
        pty::spawn_interactive(self, env, vars, cwd)
    }

    #[cfg(not(unix))]
    pub fn activate(&self, env: &Env, vars: &EnvVars, cwd: &Path) -> Result<i32> {
        let mut command = std::process::Command::new(&self.path);
        command
            .env_clear()
            .envs(vars.iter())
            .env(external::VIRTUAL_ENV, env.path())
            .current_dir(cwd);
        let mut paths = vec![env.bin_dir()];
        if let Some(existing) = vars.get(external::PATH) {
            paths.extend(std::env::split_paths(existing));
        }
        if let Ok(joined) = std::env::join_paths(paths) {
            command.env(external::PATH, joined);
        }
        let status = command.status().map_err(|source| EnvError::Spawn {
            command: self.path.display().to_string(),
            source,
        })?;
        Ok(status.code().unwrap_or(1))
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shell(\"{}\", \"{}\")", self.name, self.path.display())
    }
}

/// `/usr/local/bin/zsh` → `zsh`, `C:\Windows\System32\cmd.exe` → `cmd`;
/// login shells show up as `-bash`.
fn shell_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().trim_start_matches('-').to_lowercase())
        .unwrap_or_default()
}

#[cfg(target_os = "linux")]
fn detect_from_process_tree() -> Option<Shell> {
    let mut pid = std::os::unix::process::parent_id();
    for _ in 0..MAX_DEPTH {
        if pid <= 1 {
            return None;
        }
        if let Ok(exe) = std::fs::read_link(format!("/proc/{pid}/exe")) {
            let name = shell_name(&exe);
            if KNOWN_SHELLS.contains(&name.as_str()) {
                return Some(Shell { name, path: exe });
            }
        }
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        pid = parent_pid_from_stat(&stat)?;
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn detect_from_process_tree() -> Option<Shell> {
    None
}

/// Field 4 of `/proc/<pid>/stat`. The command name (field 2) may itself
/// contain spaces and parentheses, so parsing starts after the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parent_pid_from_stat(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}
