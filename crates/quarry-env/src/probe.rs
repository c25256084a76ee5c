//! Introspection scripts piped into an interpreter's stdin, and parsers for
//! what they print.

use crate::error::{EnvError, Result};
use crate::process::{self, Invocation};
use quarry_core::Version;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const GET_PYTHON_VERSION: &str = "\
import sys

print('.'.join([str(s) for s in sys.version_info[:3]]))
";

pub const GET_ENVIRONMENT_INFO: &str = r#"
import json
import os
import platform
import sys

if hasattr(sys, "implementation"):
    info = sys.implementation.version
    iver = "{0.major}.{0.minor}.{0.micro}".format(info)
    kind = info.releaselevel
    if kind != "final":
        iver += kind[0] + str(info.serial)

    implementation_name = sys.implementation.name
else:
    iver = "0"
    implementation_name = ""

env = {
    "implementation_name": implementation_name,
    "implementation_version": iver,
    "os_name": os.name,
    "platform_machine": platform.machine(),
    "platform_release": platform.release(),
    "platform_system": platform.system(),
    "platform_version": platform.version(),
    "python_full_version": platform.python_version(),
    "platform_python_implementation": platform.python_implementation(),
    "python_version": ".".join(platform.python_version_tuple()[:2]),
    "sys_platform": sys.platform,
    "version_info": [v for v in sys.version_info[:3]],
}

print(json.dumps(env))
"#;

pub const GET_BASE_PREFIX: &str = r#"
import sys

if hasattr(sys, "real_prefix"):
    print(sys.real_prefix)
elif hasattr(sys, "base_prefix"):
    print(sys.base_prefix)
else:
    print(sys.prefix)
"#;

pub const GET_SYS_PATH: &str = "\
import json
import sys

print(json.dumps(sys.path))
";

const GET_CONFIG_VAR: &str = "\
import sysconfig

print(sysconfig.get_config_var(\"{config_var}\"))
";

/// Everything needed to treat an interpreter as the host runtime.
pub const GET_HOST_INFO: &str = r#"
import json
import sys

base = getattr(sys, "real_prefix", getattr(sys, "base_prefix", sys.prefix))
print(json.dumps({
    "executable": sys.executable,
    "prefix": sys.prefix,
    "base_prefix": base,
    "version_info": [v for v in sys.version_info[:3]],
}))
"#;

const CREATE_VENV_COMMAND: &str = r#"
path = {path}

try:
    from venv import EnvBuilder

    builder = EnvBuilder(with_pip=True)
    build = builder.create
except ImportError:
    # Python 2.7 has no venv module
    from virtualenv import create_environment

    build = create_environment

build(path)
"#;

pub fn config_var_script(name: &str) -> String {
    GET_CONFIG_VAR.replace("{config_var}", name)
}

pub fn create_venv_script(path: &str) -> String {
    // JSON string literals are valid Python string literals.
    let quoted = serde_json::to_string(path).unwrap_or_else(|_| format!("{path:?}"));
    CREATE_VENV_COMMAND.replace("{path}", &quoted)
}

/// Facts used to evaluate environment markers of dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerEnv {
    pub implementation_name: String,
    pub implementation_version: String,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: String,
    pub platform_python_implementation: String,
    pub python_version: String,
    pub sys_platform: String,
    pub version_info: Vec<u64>,
}

/// Result of `sysconfig.get_config_var`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    None,
    Int(i64),
    Str(String),
}

/// The interpreter found on `PATH` that stands in for "the system".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostInterpreter {
    pub executable: PathBuf,
    pub prefix: PathBuf,
    pub base_prefix: PathBuf,
    pub version_info: Vec<u64>,
}

impl HostInterpreter {
    pub fn version(&self) -> Version {
        Version::from_info(&self.version_info)
    }
}

/// Host-side interpreter discovery, the seam the environment manager uses to
/// talk to real interpreters.
pub trait Probe {
    /// Version of the interpreter `executable` (a name on `PATH` or a path).
    fn python_version(&self, executable: &str) -> Result<Version>;

    /// The interpreter used when no environment applies.
    fn host(&self) -> Result<HostInterpreter>;
}

/// [`Probe`] backed by real subprocesses.
#[derive(Debug, Default)]
pub struct SystemProbe {
    host: OnceCell<HostInterpreter>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Probe for SystemProbe {
    fn python_version(&self, executable: &str) -> Result<Version> {
        let output = process::run(
            &Invocation::capture(vec![executable.to_string(), "-".to_string()])
                .with_input(GET_PYTHON_VERSION),
        )?
        .into_output();
        parse_version_output(executable, &output)
    }

    fn host(&self) -> Result<HostInterpreter> {
        if let Some(host) = self.host.get() {
            return Ok(host.clone());
        }
        let executable = ["python3", "python"]
            .into_iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| EnvError::Spawn {
                command: "python3".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no python3 or python on PATH",
                ),
            })?;
        let output = process::run(
            &Invocation::capture(vec![executable.to_string_lossy().into_owned(), "-".to_string()])
                .with_input(GET_HOST_INFO),
        )?
        .into_output();
        let host: HostInterpreter =
            serde_json::from_str(output.trim()).map_err(|e| EnvError::InvalidOutput {
                what: executable.display().to_string(),
                detail: e.to_string(),
            })?;
        tracing::debug!(
            "Host interpreter {} ({})",
            host.executable.display(),
            host.version()
        );
        let _ = self.host.set(host.clone());
        Ok(host)
    }
}

pub fn parse_version_output(executable: &str, output: &str) -> Result<Version> {
    Version::parse(output.trim()).map_err(|e| EnvError::InvalidOutput {
        what: executable.to_string(),
        detail: e.to_string(),
    })
}

pub fn parse_marker_env(output: &str) -> Result<MarkerEnv> {
    serde_json::from_str(output.trim()).map_err(|e| EnvError::InvalidOutput {
        what: "environment info".to_string(),
        detail: e.to_string(),
    })
}

pub fn parse_sys_path(output: &str) -> Result<Vec<String>> {
    serde_json::from_str(output.trim()).map_err(|e| EnvError::InvalidOutput {
        what: "sys.path".to_string(),
        detail: e.to_string(),
    })
}

pub fn parse_config_var(output: &str) -> ConfigValue {
    match output.trim() {
        "None" => ConfigValue::None,
        "1" => ConfigValue::Int(1),
        "0" => ConfigValue::Int(0),
        other => ConfigValue::Str(other.to_string()),
    }
}

/// `pip X.Y[.Z] from ...` → version; anything unrecognisable is `0.0`.
pub fn parse_pip_version(output: &str) -> Version {
    static PIP_VERSION: OnceLock<Regex> = OnceLock::new();
    let re = PIP_VERSION
        .get_or_init(|| Regex::new(r"^pip (.+?)(?: from .+)?$").expect("pip version regex is valid"));
    re.captures(output.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| {
            let raw = m.as_str();
            // Keep the numeric release part (`23.0.1`), drop suffixes like `b1`.
            let numeric: Vec<&str> = raw
                .split('.')
                .take(3)
                .map_while(|p| {
                    let digits = p.trim_end_matches(|c: char| !c.is_ascii_digit());
                    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                        .then_some(digits)
                })
                .collect();
            Version::parse(&numeric.join(".")).ok()
        })
        .unwrap_or(Version {
            major: 0,
            minor: 0,
            patch: 0,
            precision: 2,
        })
}
