use super::{Runtime, RuntimeKind, RuntimeState};
use crate::error::Result;
use crate::probe::{ConfigValue, MarkerEnv};
use crate::process::{self, Invocation, Outcome, RunMode};
use quarry_core::Version;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Records what would have been run instead of running it.
///
/// With [`InertRuntime::delegating`] the invocation is still recorded but
/// also carried out for real. Executables resolve to their bare names.
#[derive(Debug, Clone)]
pub struct InertRuntime {
    state: RuntimeState,
    delegate: bool,
    executed: RefCell<Vec<Invocation>>,
}

impl InertRuntime {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(path.into(), None, false)
    }

    pub fn delegating(path: impl Into<PathBuf>) -> Self {
        Self::build(path.into(), None, true)
    }

    pub(crate) fn build(path: PathBuf, base: Option<PathBuf>, delegate: bool) -> Self {
        Self {
            state: RuntimeState::new(path, base),
            delegate,
            executed: RefCell::new(Vec::new()),
        }
    }

    /// Every invocation seen so far, oldest first.
    pub fn executed(&self) -> Vec<Invocation> {
        self.executed.borrow().clone()
    }

    /// Argument vectors only.
    pub fn executed_argv(&self) -> Vec<Vec<String>> {
        self.executed.borrow().iter().map(|i| i.argv.clone()).collect()
    }

    pub(crate) fn record(&self, invocation: Invocation) -> Result<Outcome> {
        self.executed.borrow_mut().push(invocation.clone());
        if self.delegate {
            return process::run(&invocation);
        }
        Ok(match invocation.mode {
            RunMode::Capture => Outcome::Output(String::new()),
            RunMode::Call => Outcome::Status(0),
        })
    }

    pub(crate) fn record_execute(&self, argv: Vec<String>) -> Result<i32> {
        self.executed.borrow_mut().push(Invocation::call(argv.clone()));
        if self.delegate {
            return process::replace_process(&argv);
        }
        Ok(0)
    }

    pub(crate) fn state(&self) -> &RuntimeState {
        &self.state
    }
}

impl Runtime for InertRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Inert
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
        bin.to_string()
    }

    fn dispatch(&self, invocation: Invocation) -> Result<Outcome> {
        self.record(invocation)
    }

    fn execute(&self, bin: &str, args: &[&str]) -> Result<i32> {
        self.record_execute(super::argv(self.resolve(bin), args))
    }

    fn marker_env(&self) -> Result<MarkerEnv> {
        if self.delegate {
            return self.state.cached_marker_env(|| super::probe_marker_env(self));
        }
        Ok(super::synthetic_marker_env(
            &[3, 7, 0],
            "CPython",
            super::current_sys_platform(),
            super::current_os_name(),
        ))
    }

    fn sys_path(&self) -> Result<Vec<String>> {
        if self.delegate {
            return super::probe_sys_path(self);
        }
        Ok(Vec::new())
    }

    fn config_var(&self, name: &str) -> ConfigValue {
        if self.delegate {
            return super::probe_config_var(self, name);
        }
        ConfigValue::None
    }

    fn pip_command(&self) -> Vec<String> {
        vec![self.python(), "-m".to_string(), "pip".to_string()]
    }

    fn pip_version(&self) -> Result<Version> {
        if self.delegate {
            return self
                .state
                .cached_pip_version(|| super::probe_pip_version(self));
        }
        Ok(Version::new(19, 1, 0))
    }

    fn is_venv(&self) -> bool {
        self.state.path != self.state.base
    }
}
