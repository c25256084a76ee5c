//! The execution surface shared by every kind of Python environment.
//!
//! [`Runtime`] is implemented by four types, chosen when the value is built:
//!
//! - [`HostRuntime`]: the interpreter found on the host, used when no
//!   environment applies.
//! - [`SandboxRuntime`]: a virtualenv; every invocation runs with the env's
//!   `bin` first on `PATH` and `VIRTUAL_ENV` pointing at it.
//! - [`InertRuntime`]: records invocations instead of running them.
//! - [`SimulatedRuntime`]: an inert runtime that reports made-up version and
//!   platform facts.
//!
//! [`Env`] is the closed set of the four, which is what the manager hands out.

mod host;
mod inert;
mod sandbox;
mod simulated;

pub use host::HostRuntime;
pub use inert::InertRuntime;
pub use sandbox::SandboxRuntime;
pub use simulated::SimulatedRuntime;

use crate::error::Result;
use crate::probe::{self, ConfigValue, MarkerEnv};
use crate::process::{Invocation, Outcome};
use quarry_core::Version;
use std::cell::OnceCell;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Host,
    Sandbox,
    Inert,
    Simulated,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeKind::Host => "SystemEnv",
            RuntimeKind::Sandbox => "VirtualEnv",
            RuntimeKind::Inert => "NullEnv",
            RuntimeKind::Simulated => "MockEnv",
        })
    }
}

pub const IS_WINDOWS: bool = cfg!(windows);

/// `sys.platform` of the platform this binary was built for.
pub fn current_sys_platform() -> &'static str {
    match std::env::consts::OS {
        "linux" => "linux",
        "macos" => "darwin",
        "windows" => "win32",
        "freebsd" => "freebsd",
        other => other,
    }
}

/// `os.name` of the platform this binary was built for.
pub fn current_os_name() -> &'static str {
    if IS_WINDOWS {
        "nt"
    } else {
        "posix"
    }
}

/// Paths and lazily filled caches common to every variant. A cache is only
/// ever reset by building a new value.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeState {
    pub(crate) path: PathBuf,
    pub(crate) base: PathBuf,
    pub(crate) bin_dir: PathBuf,
    pub(crate) marker_env: OnceCell<MarkerEnv>,
    pub(crate) pip_version: OnceCell<Version>,
}

impl RuntimeState {
    pub(crate) fn new(path: PathBuf, base: Option<PathBuf>) -> Self {
        let bin_dir = path.join(if IS_WINDOWS { "Scripts" } else { "bin" });
        Self {
            base: base.unwrap_or_else(|| path.clone()),
            path,
            bin_dir,
            marker_env: OnceCell::new(),
            pip_version: OnceCell::new(),
        }
    }

    /// Path of `bin` inside the env, or the bare name when it is not there.
    pub(crate) fn resolve(&self, bin: &str) -> String {
        let file = if IS_WINDOWS {
            format!("{bin}.exe")
        } else {
            bin.to_string()
        };
        let candidate = self.bin_dir.join(&file);
        if candidate.exists() {
            return candidate.to_string_lossy().into_owned();
        }
        // Some Windows installs keep executables at the root of the prefix.
        if IS_WINDOWS {
            let root = self.path.join(&file);
            if root.exists() {
                return root.to_string_lossy().into_owned();
            }
        }
        bin.to_string()
    }

    pub(crate) fn cached_marker_env<F>(&self, probe: F) -> Result<MarkerEnv>
    where
        F: FnOnce() -> Result<MarkerEnv>,
    {
        if let Some(env) = self.marker_env.get() {
            return Ok(env.clone());
        }
        let env = probe()?;
        let _ = self.marker_env.set(env.clone());
        Ok(env)
    }

    pub(crate) fn cached_pip_version<F>(&self, probe: F) -> Result<Version>
    where
        F: FnOnce() -> Result<Version>,
    {
        if let Some(v) = self.pip_version.get() {
            return Ok(*v);
        }
        let v = probe()?;
        let _ = self.pip_version.set(v);
        Ok(v)
    }
}

pub trait Runtime: fmt::Debug {
    fn kind(&self) -> RuntimeKind;

    /// Root prefix of the environment.
    fn path(&self) -> &Path;

    /// Prefix of the interpreter the environment was created from.
    fn base(&self) -> &Path;

    /// Where the environment keeps its executables.
    fn bin_dir(&self) -> PathBuf;

    /// Full path of executable `bin`, or `bin` itself when the env lacks it.
    fn resolve(&self, bin: &str) -> String;

    /// Run one invocation the way this variant runs things.
    fn dispatch(&self, invocation: Invocation) -> Result<Outcome>;

    /// Hand the process over to `bin` (exec on unix; spawn-and-wait elsewhere).
    fn execute(&self, bin: &str, args: &[&str]) -> Result<i32>;

    fn marker_env(&self) -> Result<MarkerEnv>;

    fn sys_path(&self) -> Result<Vec<String>>;

    fn config_var(&self, name: &str) -> ConfigValue;

    fn pip_command(&self) -> Vec<String>;

    fn pip_version(&self) -> Result<Version>;

    fn is_venv(&self) -> bool;

    /// Whether the environment is usable at all.
    fn is_sane(&self) -> bool {
        true
    }

    fn version_info(&self) -> Result<Vec<u64>> {
        Ok(self.marker_env()?.version_info)
    }

    fn version(&self) -> Result<Version> {
        Ok(Version::from_info(&self.version_info()?))
    }

    fn python_implementation(&self) -> Result<String> {
        Ok(self.marker_env()?.platform_python_implementation)
    }

    fn platform(&self) -> String {
        current_sys_platform().to_string()
    }

    fn os_name(&self) -> String {
        current_os_name().to_string()
    }

    fn python(&self) -> String {
        self.resolve("python")
    }

    fn pip(&self) -> String {
        self.resolve("pip")
    }

    /// Run `bin` and return its stdout; non-zero exit is an error.
    fn run(&self, bin: &str, args: &[&str]) -> Result<String> {
        self.dispatch(Invocation::capture(argv(self.resolve(bin), args)))
            .map(Outcome::into_output)
    }

    /// Like [`Runtime::run`], feeding `input` to stdin.
    fn run_with_input(&self, bin: &str, args: &[&str], input: &str) -> Result<String> {
        self.dispatch(Invocation::capture(argv(self.resolve(bin), args)).with_input(input))
            .map(Outcome::into_output)
    }

    /// Run `bin` with inherited stdio and return its exit code.
    fn call(&self, bin: &str, args: &[&str]) -> Result<i32> {
        self.dispatch(Invocation::call(argv(self.resolve(bin), args)))
            .map(|outcome| outcome.code())
    }

    fn run_pip(&self, args: &[&str]) -> Result<String> {
        let mut cmd = self.pip_command();
        cmd.extend(args.iter().map(|a| a.to_string()));
        self.dispatch(Invocation::capture(cmd)).map(Outcome::into_output)
    }

    fn site_packages(&self) -> Result<PathBuf> {
        // PyPy3 virtualenvs keep site-packages at the root.
        let flat = self.path().join("site-packages");
        if flat.exists() {
            return Ok(flat);
        }
        if IS_WINDOWS {
            return Ok(self.path().join("Lib").join("site-packages"));
        }
        let info = self.version_info()?;
        let (major, minor) = (
            info.first().copied().unwrap_or(0),
            info.get(1).copied().unwrap_or(0),
        );
        Ok(self
            .path()
            .join("lib")
            .join(format!("python{major}.{minor}"))
            .join("site-packages"))
    }
}

pub(crate) fn argv(program: String, args: &[&str]) -> Vec<String> {
    std::iter::once(program)
        .chain(args.iter().map(|a| a.to_string()))
        .collect()
}

/// Probe marker env, sys.path and config vars by running scripts through
/// `runtime` itself (so sandbox env rewriting applies).
pub(crate) fn probe_marker_env(runtime: &dyn Runtime) -> Result<MarkerEnv> {
    let output = runtime.run_with_input("python", &["-"], probe::GET_ENVIRONMENT_INFO)?;
    probe::parse_marker_env(&output)
}

pub(crate) fn probe_sys_path(runtime: &dyn Runtime) -> Result<Vec<String>> {
    let output = runtime.run_with_input("python", &["-"], probe::GET_SYS_PATH)?;
    probe::parse_sys_path(&output)
}

pub(crate) fn probe_config_var(runtime: &dyn Runtime, name: &str) -> ConfigValue {
    match runtime.run_with_input("python", &["-"], &probe::config_var_script(name)) {
        Ok(output) => probe::parse_config_var(&output),
        Err(e) => {
            tracing::warn!("{}", e);
            ConfigValue::None
        }
    }
}

pub(crate) fn probe_pip_version(runtime: &dyn Runtime) -> Result<Version> {
    let output = runtime.run_pip(&["--version"])?;
    Ok(probe::parse_pip_version(&output))
}

/// Marker facts made up from compile-time platform information.
pub(crate) fn synthetic_marker_env(
    version_info: &[u64],
    implementation: &str,
    sys_platform: &str,
    os_name: &str,
) -> MarkerEnv {
    let version = Version::from_info(version_info);
    MarkerEnv {
        implementation_name: implementation.to_lowercase(),
        implementation_version: version.to_string(),
        os_name: os_name.to_string(),
        platform_machine: std::env::consts::ARCH.to_string(),
        platform_release: String::new(),
        platform_system: match sys_platform {
            "darwin" => "Darwin".to_string(),
            "win32" => "Windows".to_string(),
            "linux" => "Linux".to_string(),
            other => other.to_string(),
        },
        platform_version: String::new(),
        python_full_version: version.to_string(),
        platform_python_implementation: implementation.to_string(),
        python_version: version.minor_text(),
        sys_platform: sys_platform.to_string(),
        version_info: version_info.to_vec(),
    }
}

/// One of the four runtime variants.
#[derive(Debug, Clone)]
pub enum Env {
    Host(HostRuntime),
    Sandbox(SandboxRuntime),
    Inert(InertRuntime),
    Simulated(SimulatedRuntime),
}

impl Env {
    pub fn runtime(&self) -> &(dyn Runtime + 'static) {
        match self {
            Env::Host(r) => r,
            Env::Sandbox(r) => r,
            Env::Inert(r) => r,
            Env::Simulated(r) => r,
        }
    }
}

impl Deref for Env {
    type Target = dyn Runtime;

    fn deref(&self) -> &Self::Target {
        self.runtime()
    }
}

/// Same variant and same path.
impl PartialEq for Env {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.path() == other.path()
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(\"{}\")", self.kind(), self.path().display())
    }
}

impl From<HostRuntime> for Env {
    fn from(r: HostRuntime) -> Self {
        Env::Host(r)
    }
}

impl From<SandboxRuntime> for Env {
    fn from(r: SandboxRuntime) -> Self {
        Env::Sandbox(r)
    }
}

impl From<InertRuntime> for Env {
    fn from(r: InertRuntime) -> Self {
        Env::Inert(r)
    }
}

impl From<SimulatedRuntime> for Env {
    fn from(r: SimulatedRuntime) -> Self {
        Env::Simulated(r)
    }
}
