//! Errors raised while discovering, probing and managing environments.

use quarry_core::Version;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    /// The process ran and exited non-zero.
    #[error("{}", command_message(.command, .code, .output, .input))]
    Command {
        command: Vec<String>,
        code: i32,
        output: String,
        input: Option<String>,
    },

    /// The executable could not be started at all.
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", no_compatible_message(.expected, .given))]
    NoCompatiblePython {
        expected: String,
        given: Option<Version>,
    },

    #[error("Environment \"{name}\" does not exist.")]
    UnknownEnv { name: String },

    #[error("Unexpected output from {what}: {detail}")]
    InvalidOutput { what: String, detail: String },

    #[error("Environments file {path} is unusable: {detail}")]
    Store { path: PathBuf, detail: String },

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to detect the current shell.")]
    ShellDetection,
}

impl EnvError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EnvError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// True for failures that only mean "this interpreter is not usable",
    /// which the compatible-interpreter search skips over.
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            EnvError::Command { .. } | EnvError::Spawn { .. } | EnvError::InvalidOutput { .. }
        )
    }
}

fn command_message(
    command: &[String],
    code: &i32,
    output: &str,
    input: &Option<String>,
) -> String {
    let mut message = format!(
        "Command {:?} errored with the following return code {}, and output: \n{}",
        command, code, output
    );
    if let Some(input) = input {
        message.push_str(&format!("input was : {}", input));
    }
    message
}

fn no_compatible_message(expected: &str, given: &Option<Version>) -> String {
    match given {
        Some(given) => format!(
            "The specified Python version ({}) is not supported by the project ({}).\n\
             Please choose a compatible version or loosen the python constraint \
             specified in the pyproject.toml file.",
            given, expected
        ),
        None => "Quarry was unable to find a compatible version. If you have one, \
                 you can explicitly use it via the \"env use\" command."
            .to_string(),
    }
}

pub type Result<T, E = EnvError> = std::result::Result<T, E>;
