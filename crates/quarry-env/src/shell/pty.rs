//! Interactive shell on a pseudo-terminal.
//!
//! The shell runs as session leader on the pty's slave side. We sit between
//! the user's terminal (switched to raw mode) and the master side, copying
//! bytes both ways, and push terminal resizes through on SIGWINCH.

use super::Shell;
use crate::error::{EnvError, Result};
use crate::runtime::Env;
use nix::pty::{openpty, Winsize};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use quarry_core::config::EnvVars;
use signal_hook::consts::SIGWINCH;
use signal_hook::iterator::Signals;
use std::fs::File;
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

nix::ioctl_read_bad!(tiocgwinsz, libc::TIOCGWINSZ, libc::winsize);
nix::ioctl_write_ptr_bad!(tiocswinsz, libc::TIOCSWINSZ, libc::winsize);

pub(super) fn spawn_interactive(
    shell: &Shell,
    env: &Env,
    vars: &EnvVars,
    cwd: &Path,
) -> Result<i32> {
    let size = terminal_size(io::stdin().as_raw_fd());
    let pty = openpty(size.as_ref(), None).map_err(|e| pty_error("Failed to open", e))?;

    if shell.name() == "zsh" {
        // zsh would echo the activation line back at the user.
        disable_echo(&pty.slave)?;
    }

    let mut child = {
        let stdio = |fd: &OwnedFd| -> Result<Stdio> {
            fd.try_clone()
                .map(Stdio::from)
                .map_err(|e| EnvError::io("Failed to duplicate", "pty", e))
        };
        let mut command = Command::new(shell.path());
        command
            .arg("-i")
            .env_clear()
            .envs(vars.iter())
            .current_dir(cwd)
            .stdin(stdio(&pty.slave)?)
            .stdout(stdio(&pty.slave)?)
            .stderr(stdio(&pty.slave)?);
        #[allow(unsafe_code)]
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map_err(io::Error::from)?;
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        command.spawn().map_err(|source| EnvError::Spawn {
            command: shell.path().display().to_string(),
            source,
        })?
    };
    drop(pty.slave);

    let mut master = File::from(pty.master);
    let master_in = master
        .try_clone()
        .map_err(|e| EnvError::io("Failed to duplicate", "pty", e))?;
    let master_fd = master.as_raw_fd();

    let _raw = RawMode::enter()?;

    writeln!(master, "{}", shell.activation_line(env))
        .map_err(|e| EnvError::io("Failed to write to", "pty", e))?;

    forward_resizes(master_fd)?;

    thread::spawn(move || {
        let mut master_in = master_in;
        let _ = io::copy(&mut io::stdin().lock(), &mut master_in);
    });

    // Ends with EIO once the shell has exited and the slave side is closed.
    let mut stdout = io::stdout().lock();
    let mut buf = [0u8; 4096];
    loop {
        match master.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if stdout.write_all(&buf[..n]).is_err() {
                    break;
                }
                let _ = stdout.flush();
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    let status = child
        .wait()
        .map_err(|e| EnvError::io("Failed to wait for", shell.path(), e))?;
    Ok(crate::process::exit_code(status))
}

fn terminal_size(fd: i32) -> Option<Winsize> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    #[allow(unsafe_code)]
    let ok = unsafe { tiocgwinsz(fd, &mut size) }.is_ok();
    (ok && size.ws_row > 0).then_some(size)
}

fn forward_resizes(master_fd: i32) -> Result<()> {
    let mut signals =
        Signals::new([SIGWINCH]).map_err(|e| EnvError::io("Failed to watch", "SIGWINCH", e))?;
    thread::spawn(move || {
        for _ in signals.forever() {
            if let Some(size) = terminal_size(io::stdin().as_raw_fd()) {
                #[allow(unsafe_code)]
                let _ = unsafe { tiocswinsz(master_fd, &size) };
            }
        }
    });
    Ok(())
}

fn disable_echo(fd: &OwnedFd) -> Result<()> {
    let mut attrs =
        termios::tcgetattr(fd).map_err(|e| pty_error("Failed to read attributes of", e))?;
    attrs.local_flags.remove(LocalFlags::ECHO);
    termios::tcsetattr(fd, SetArg::TCSANOW, &attrs)
        .map_err(|e| pty_error("Failed to configure", e))
}

fn pty_error(action: &'static str, errno: nix::errno::Errno) -> EnvError {
    EnvError::io(action, "pty", io::Error::from(errno))
}

/// Local terminal in raw mode until dropped; a no-op when stdin is not a tty.
struct RawMode {
    saved: Option<Termios>,
}

impl RawMode {
    fn enter() -> Result<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(Self { saved: None });
        }
        let saved = termios::tcgetattr(&stdin)
            .map_err(|e| pty_error("Failed to read attributes of", e))?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)
            .map_err(|e| pty_error("Failed to configure", e))?;
        Ok(Self { saved: Some(saved) })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            let _ = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, saved);
        }
    }
}
