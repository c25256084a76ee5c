//! Environment variable key constants and their aliases.
//!
//! Primary keys use the `QUARRY_*` prefix. The `POETRY_*` spellings are read
//! as fallbacks so existing shells keep working after a switch.

/// Cache and virtualenv locations
pub mod paths {
    pub const QUARRY_CACHE_DIR: &str = "QUARRY_CACHE_DIR";
    pub const CACHE_DIR_ALIASES: &[&str] = &["POETRY_CACHE_DIR"];

    pub const QUARRY_VIRTUALENVS_PATH: &str = "QUARRY_VIRTUALENVS_PATH";
    pub const VIRTUALENVS_PATH_ALIASES: &[&str] = &["POETRY_VIRTUALENVS_PATH"];
}

/// Virtualenv behaviour switches
pub mod virtualenvs {
    pub const QUARRY_VIRTUALENVS_CREATE: &str = "QUARRY_VIRTUALENVS_CREATE";
    pub const CREATE_ALIASES: &[&str] = &["POETRY_VIRTUALENVS_CREATE"];

    pub const QUARRY_VIRTUALENVS_IN_PROJECT: &str = "QUARRY_VIRTUALENVS_IN_PROJECT";
    pub const IN_PROJECT_ALIASES: &[&str] = &["POETRY_VIRTUALENVS_IN_PROJECT"];
}

/// Observability and logging
pub mod observability {
    pub const QUARRY_QUIET: &str = "QUARRY_QUIET";
    pub const QUIET_ALIASES: &[&str] = &[];

    pub const QUARRY_LOG_LEVEL: &str = "QUARRY_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &[];

    pub const QUARRY_LOG_JSON: &str = "QUARRY_LOG_JSON";
    pub const LOG_JSON_ALIASES: &[&str] = &[];
}

/// Variables written by other tools that decide which interpreter is live.
pub mod external {
    pub const VIRTUAL_ENV: &str = "VIRTUAL_ENV";
    pub const CONDA_PREFIX: &str = "CONDA_PREFIX";
    pub const CONDA_DEFAULT_ENV: &str = "CONDA_DEFAULT_ENV";
    pub const PATH: &str = "PATH";
    pub const SHELL: &str = "SHELL";
    pub const COMSPEC: &str = "COMSPEC";

    /// Must never leak into a sandboxed interpreter.
    pub const PYTHONHOME: &str = "PYTHONHOME";
    /// Set by the macOS framework launcher; breaks venv resolution when inherited.
    pub const PYVENV_LAUNCHER: &str = "__PYVENV_LAUNCHER__";
}

/// Set inside shells spawned by `quarry shell` to avoid nesting.
pub const QUARRY_ACTIVE: &str = "QUARRY_ACTIVE";
