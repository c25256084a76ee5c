use super::{Runtime, RuntimeKind, RuntimeState};
use crate::error::Result;
use crate::probe::{self, ConfigValue, MarkerEnv};
use crate::process::{self, Invocation, Outcome};
use quarry_core::config::env_keys::external;
use quarry_core::config::ScopedEnv;
use quarry_core::Version;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// A virtualenv.
///
/// Programs started through it see the environment's `bin` directory first
/// on `PATH`, `VIRTUAL_ENV` set to its root, and neither `PYTHONHOME` nor
/// `__PYVENV_LAUNCHER__`. The caller's environment is restored afterwards.
#[derive(Debug, Clone)]
pub struct SandboxRuntime {
    state: RuntimeState,
    base: OnceCell<PathBuf>,
}

impl SandboxRuntime {
    /// Wrap the virtualenv at `path`. Its base prefix is asked of the env's
    /// own interpreter the first time it is needed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            state: RuntimeState::new(path.into(), None),
            base: OnceCell::new(),
        }
    }

    pub fn with_base(path: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        let runtime = Self::new(path);
        let _ = runtime.base.set(base.into());
        runtime
    }

    fn probe_base(&self) -> PathBuf {
        match self.run_with_input("python", &["-"], probe::GET_BASE_PREFIX) {
            Ok(output) => PathBuf::from(output.trim()),
            Err(e) => {
                tracing::warn!(
                    "Unable to determine the base prefix of {}: {}",
                    self.state.path.display(),
                    e
                );
                self.state.path.clone()
            }
        }
    }

    /// Rewrite the process environment for the duration of the returned guard.
    fn activate(&self) -> ScopedEnv {
        let guard = ScopedEnv::new();
        let mut paths = vec![self.state.bin_dir.clone()];
        if let Some(existing) = std::env::var_os(external::PATH) {
            paths.extend(std::env::split_paths(&existing));
        }
        if let Ok(joined) = std::env::join_paths(paths) {
            guard.set(external::PATH, &joined.to_string_lossy());
        }
        guard
            .set(external::VIRTUAL_ENV, &self.state.path.to_string_lossy())
            .unset(external::PYTHONHOME)
            .unset(external::PYVENV_LAUNCHER);
        guard
    }
}

impl Runtime for SandboxRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Sandbox
    }

    fn path(&self) -> &Path {
        &self.state.path
    }

    fn base(&self) -> &Path {
        self.base.get_or_init(|| self.probe_base())
    }

    fn bin_dir(&self) -> PathBuf {
        self.state.bin_dir.clone()
    }

    fn resolve(&self, bin: &str) -> String {
        self.state.resolve(bin)
    }

    fn dispatch(&self, invocation: Invocation) -> Result<Outcome> {
        tracing::debug!(
            "Running {:?} in {}",
            invocation.argv,
            self.state.path.display()
        );
        let _env = self.activate();
        process::run(&invocation)
    }

    fn execute(&self, bin: &str, args: &[&str]) -> Result<i32> {
        let argv = super::argv(self.resolve(bin), args);
        // On unix exec replaces us, so the guard's restore only matters when
        // the exec itself fails or when spawning elsewhere.
        let _env = self.activate();
        process::replace_process(&argv)
    }

    fn marker_env(&self) -> Result<MarkerEnv> {
        self.state.cached_marker_env(|| super::probe_marker_env(self))
    }

    fn sys_path(&self) -> Result<Vec<String>> {
        super::probe_sys_path(self)
    }

    fn config_var(&self, name: &str) -> ConfigValue {
        super::probe_config_var(self, name)
    }

    fn pip_command(&self) -> Vec<String> {
        vec![self.pip()]
    }

    fn pip_version(&self) -> Result<Version> {
        self.state.cached_pip_version(|| super::probe_pip_version(self))
    }

    fn is_venv(&self) -> bool {
        true
    }

    /// Both `python` and `pip` must resolve to files inside the env.
    fn is_sane(&self) -> bool {
        [self.python(), self.pip()]
            .iter()
            .all(|p| Path::new(p).is_file())
    }
}
