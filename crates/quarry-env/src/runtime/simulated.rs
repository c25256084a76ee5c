use super::{InertRuntime, Runtime, RuntimeKind};
use crate::error::Result;
use crate::probe::{ConfigValue, MarkerEnv};
use crate::process::{Invocation, Outcome};
use quarry_core::Version;
use std::path::{Path, PathBuf};

/// An inert runtime that reports whatever version and platform it was
/// configured with.
#[derive(Debug, Clone)]
pub struct SimulatedRuntime {
    inner: InertRuntime,
    version_info: Vec<u64>,
    implementation: String,
    platform: String,
    os_name: String,
    is_venv: bool,
    pip_version: Version,
    sane: bool,
}

impl SimulatedRuntime {
    pub fn builder() -> SimulatedBuilder {
        SimulatedBuilder::default()
    }

    pub fn executed_argv(&self) -> Vec<Vec<String>> {
        self.inner.executed_argv()
    }

    pub fn executed(&self) -> Vec<Invocation> {
        self.inner.executed()
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedBuilder {
    path: PathBuf,
    base: Option<PathBuf>,
    version_info: Vec<u64>,
    implementation: String,
    platform: String,
    os_name: String,
    is_venv: bool,
    pip_version: Version,
    sane: bool,
    delegate: bool,
}

impl Default for SimulatedBuilder {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/prefix"),
            base: None,
            version_info: vec![3, 7, 0],
            implementation: "CPython".to_string(),
            platform: super::current_sys_platform().to_string(),
            os_name: super::current_os_name().to_string(),
            is_venv: false,
            pip_version: Version::new(19, 1, 0),
            sane: true,
            delegate: false,
        }
    }
}

impl SimulatedBuilder {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn version_info(mut self, info: &[u64]) -> Self {
        self.version_info = info.to_vec();
        self
    }

    pub fn implementation(mut self, name: impl Into<String>) -> Self {
        self.implementation = name.into();
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn os_name(mut self, os_name: impl Into<String>) -> Self {
        self.os_name = os_name.into();
        self
    }

    pub fn is_venv(mut self, is_venv: bool) -> Self {
        self.is_venv = is_venv;
        self
    }

    pub fn pip_version(mut self, version: Version) -> Self {
        self.pip_version = version;
        self
    }

    pub fn sane(mut self, sane: bool) -> Self {
        self.sane = sane;
        self
    }

    pub fn delegate(mut self, delegate: bool) -> Self {
        self.delegate = delegate;
        self
    }

    pub fn build(self) -> SimulatedRuntime {
        SimulatedRuntime {
            inner: InertRuntime::build(self.path, self.base, self.delegate),
            version_info: self.version_info,
            implementation: self.implementation,
            platform: self.platform,
            os_name: self.os_name,
            is_venv: self.is_venv,
            pip_version: self.pip_version,
            sane: self.sane,
        }
    }
}

impl Runtime for SimulatedRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Simulated
    }

    fn path(&self) -> &Path {
        &self.inner.state().path
    }

    fn base(&self) -> &Path {
        &self.inner.state().base
    }

    fn bin_dir(&self) -> PathBuf {
        self.inner.bin_dir()
    }

    fn resolve(&self, bin: &str) -> String {
        self.inner.resolve(bin)
    }

    fn dispatch(&self, invocation: Invocation) -> Result<Outcome> {
        self.inner.record(invocation)
    }

    fn execute(&self, bin: &str, args: &[&str]) -> Result<i32> {
        self.inner.record_execute(super::argv(self.resolve(bin), args))
    }

    fn marker_env(&self) -> Result<MarkerEnv> {
        Ok(super::synthetic_marker_env(
            &self.version_info,
            &self.implementation,
            &self.platform,
            &self.os_name,
        ))
    }

    fn version_info(&self) -> Result<Vec<u64>> {
        Ok(self.version_info.clone())
    }

    fn python_implementation(&self) -> Result<String> {
        Ok(self.implementation.clone())
    }

    fn platform(&self) -> String {
        self.platform.clone()
    }

    fn os_name(&self) -> String {
        self.os_name.clone()
    }

    fn sys_path(&self) -> Result<Vec<String>> {
        self.inner.sys_path()
    }

    fn config_var(&self, name: &str) -> ConfigValue {
        self.inner.config_var(name)
    }

    fn pip_command(&self) -> Vec<String> {
        self.inner.pip_command()
    }

    fn pip_version(&self) -> Result<Version> {
        Ok(self.pip_version)
    }

    fn is_venv(&self) -> bool {
        self.is_venv
    }

    fn is_sane(&self) -> bool {
        self.sane
    }
}
