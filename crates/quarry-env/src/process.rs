//! Subprocess plumbing shared by every runtime variant.
//!
//! Two ways to start a program: [`run`] blocks until it exits and either
//! captures its output or returns its exit status; [`replace_process`] hands
//! the current process over to it (exec on unix, spawn-and-wait elsewhere).

use crate::error::{EnvError, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Capture stdout, fail on non-zero exit.
    Capture,
    /// Inherit stdio and report the exit status, whatever it is.
    Call,
}

/// One program invocation, as recorded by the inert runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    /// Fed to stdin when present.
    pub input: Option<String>,
    pub mode: RunMode,
}

impl Invocation {
    pub fn capture(argv: Vec<String>) -> Self {
        Self {
            argv,
            input: None,
            mode: RunMode::Capture,
        }
    }

    pub fn call(argv: Vec<String>) -> Self {
        Self {
            argv,
            input: None,
            mode: RunMode::Call,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Status(i32),
}

impl Outcome {
    /// Captured text; empty for `Status`.
    pub fn into_output(self) -> String {
        match self {
            Outcome::Output(s) => s,
            Outcome::Status(_) => String::new(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Outcome::Output(_) => 0,
            Outcome::Status(code) => *code,
        }
    }
}

/// Run `invocation` to completion with the current process environment.
pub fn run(invocation: &Invocation) -> Result<Outcome> {
    let Some((program, args)) = invocation.argv.split_first() else {
        return Err(EnvError::InvalidOutput {
            what: "command line".to_string(),
            detail: "empty argv".to_string(),
        });
    };
    tracing::debug!("Executing {:?}", invocation.argv);

    let mut cmd = Command::new(program);
    cmd.args(args);

    if invocation.mode == RunMode::Call && invocation.input.is_none() {
        let status = cmd.status().map_err(|source| EnvError::Spawn {
            command: program.clone(),
            source,
        })?;
        return Ok(Outcome::Status(exit_code(status)));
    }

    cmd.stdin(if invocation.input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    if invocation.mode == RunMode::Capture {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    let mut child = cmd.spawn().map_err(|source| EnvError::Spawn {
        command: program.clone(),
        source,
    })?;

    // Feed stdin from a separate thread so a chatty child cannot deadlock us.
    let writer = match (child.stdin.take(), invocation.input.clone()) {
        (Some(mut stdin), Some(input)) => Some(thread::spawn(move || {
            let _ = stdin.write_all(input.as_bytes());
        })),
        _ => None,
    };

    let output = child
        .wait_with_output()
        .map_err(|source| EnvError::Spawn {
            command: program.clone(),
            source,
        })?;
    if let Some(writer) = writer {
        let _ = writer.join();
    }

    let code = exit_code(output.status);
    if invocation.mode == RunMode::Call {
        return Ok(Outcome::Status(code));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let mut combined = stdout;
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(EnvError::Command {
            command: invocation.argv.clone(),
            code,
            output: combined,
            input: invocation.input.clone(),
        });
    }
    Ok(Outcome::Output(stdout))
}

pub(crate) fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Replace the current process with `argv` (unix). Only returns on failure.
#[cfg(unix)]
pub fn replace_process(argv: &[String]) -> Result<i32> {
    use std::ffi::CString;

    let Some(program) = argv.first() else {
        return Err(EnvError::InvalidOutput {
            what: "command line".to_string(),
            detail: "empty argv".to_string(),
        });
    };
    let mut cargv = Vec::with_capacity(argv.len());
    for arg in argv {
        let c = CString::new(arg.as_str()).map_err(|_| EnvError::InvalidOutput {
            what: "command line".to_string(),
            detail: format!("argument contains NUL byte: {arg:?}"),
        })?;
        cargv.push(c);
    }
    tracing::debug!("Replacing process with {:?}", argv);
    match nix::unistd::execvp(cargv[0].as_c_str(), &cargv) {
        Ok(never) => match never {},
        Err(errno) => Err(EnvError::Spawn {
            command: program.clone(),
            source: std::io::Error::from(errno),
        }),
    }
}

/// Spawn `argv`, wait for it and return its exit code (no exec on this platform).
#[cfg(not(unix))]
pub fn replace_process(argv: &[String]) -> Result<i32> {
    let Some((program, args)) = argv.split_first() else {
        return Err(EnvError::InvalidOutput {
            what: "command line".to_string(),
            detail: "empty argv".to_string(),
        });
    };
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| EnvError::Spawn {
            command: program.clone(),
            source,
        })?;
    Ok(exit_code(status))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_capture_with_input() {
        let out = run(&Invocation::capture(argv(&["cat"])).with_input("hello")).unwrap();
        assert_eq!(out, Outcome::Output("hello".to_string()));
    }

    #[test]
    fn test_non_zero_exit_is_command_error() {
        let err = run(&Invocation::capture(argv(&["sh", "-c", "echo out; echo err >&2; exit 3"])))
            .unwrap_err();
        match err {
            EnvError::Command { code, output, .. } => {
                assert_eq!(code, 3);
                assert!(output.contains("out"));
                assert!(output.contains("err"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_call_mode_returns_status() {
        let out = run(&Invocation::call(argv(&["sh", "-c", "exit 5"]))).unwrap();
        assert_eq!(out, Outcome::Status(5));
        assert_eq!(out.code(), 5);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = run(&Invocation::capture(argv(&["quarry-definitely-missing-binary"]))).unwrap_err();
        assert!(matches!(err, EnvError::Spawn { .. }));
        assert!(err.is_probe_failure());
    }
}
