use super::{Runtime, RuntimeKind, RuntimeState};
use crate::error::Result;
use crate::probe::{ConfigValue, HostInterpreter, MarkerEnv};
use crate::process::{self, Invocation, Outcome};
use quarry_core::Version;
use std::path::{Path, PathBuf};

/// The host interpreter, used as-is.
///
/// Version facts come from the snapshot taken when the host was discovered;
/// everything else is asked of the interpreter on demand.
#[derive(Debug, Clone)]
pub struct HostRuntime {
    state: RuntimeState,
    interpreter: HostInterpreter,
}

impl HostRuntime {
    pub fn new(interpreter: HostInterpreter) -> Self {
        Self {
            state: RuntimeState::new(
                interpreter.prefix.clone(),
                Some(interpreter.base_prefix.clone()),
            ),
            interpreter,
        }
    }

    pub fn interpreter(&self) -> &HostInterpreter {
        &self.interpreter
    }
}

impl Runtime for HostRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Host
    }

    fn path(&self) -> &Path {
        &self.state.path
    }

    fn base(&self) -> &Path {
        &self.state.base
    }

    fn bin_dir(&self) -> PathBuf {
        self.state.bin_dir.clone()
    }

    fn resolve(&self, bin: &str) -> String {
        if bin == "python" {
            return self.interpreter.executable.to_string_lossy().into_owned();
        }
        self.state.resolve(bin)
    }

    fn dispatch(&self, invocation: Invocation) -> Result<Outcome> {
        tracing::debug!("Running {:?}", invocation.argv);
        process::run(&invocation)
    }

    fn execute(&self, bin: &str, args: &[&str]) -> Result<i32> {
        process::replace_process(&super::argv(self.resolve(bin), args))
    }

    fn marker_env(&self) -> Result<MarkerEnv> {
        self.state.cached_marker_env(|| super::probe_marker_env(self))
    }

    fn version_info(&self) -> Result<Vec<u64>> {
        Ok(self.interpreter.version_info.clone())
    }

    fn sys_path(&self) -> Result<Vec<String>> {
        super::probe_sys_path(self)
    }

    fn config_var(&self, name: &str) -> ConfigValue {
        super::probe_config_var(self, name)
    }

    fn pip_command(&self) -> Vec<String> {
        vec![self.python(), "-m".to_string(), "pip".to_string()]
    }

    fn pip_version(&self) -> Result<Version> {
        self.state.cached_pip_version(|| super::probe_pip_version(self))
    }

    fn is_venv(&self) -> bool {
        self.state.path != self.state.base
    }
}
