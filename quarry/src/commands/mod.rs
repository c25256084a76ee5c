//! Command handlers. Each takes the per-invocation [`Context`].

pub mod env;
pub mod run;
pub mod shell;

use anyhow::{Context as _, Result};
use quarry_core::config::{self, CacheConfig, EnvSettings, EnvVars};
use quarry_core::Project;
use quarry_env::{EnvManager, SystemProbe, VenvBuilder};
use std::path::{Path, PathBuf};

/// Everything a command needs, built once per invocation.
pub struct Context {
    pub cwd: PathBuf,
    pub vars: EnvVars,
    pub manager: EnvManager,
}

impl Context {
    pub fn load(directory: Option<&Path>) -> Result<Self> {
        let cwd = match directory {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().context("Failed to read the current directory")?,
        };
        config::load_dotenv_from_dir(&cwd);
        let vars = EnvVars::from_process();

        let project = Project::discover(&cwd)
            .with_context(|| format!("No project found in {} or its parents", cwd.display()))?;
        let settings = EnvSettings::from_vars(
            &vars,
            CacheConfig::resolved_cache_dir().join("virtualenvs"),
        );
        let manager = EnvManager::new(
            project,
            settings,
            vars.clone(),
            Box::new(SystemProbe::new()),
            Box::new(VenvBuilder),
        );
        Ok(Self { cwd, vars, manager })
    }
}
