//! Running external programs.
//!
//! All child processes go through [`Executor`] so `--dry-run` can log what
//! would have been executed instead of doing it.

use std::process::{Child, Command, Output, Stdio};

use tracing::{debug, info};

use crate::errors::{Result, VaultClientError};

/// Runs commands, or only logs them in dry-run mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor {
    dry_run: bool,
}

impl Executor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Run `cmd` to completion and capture its output.
    ///
    /// Returns `None` in dry-run mode.
    pub fn output(&self, cmd: &mut Command) -> Result<Option<Output>> {
        let line = render(cmd);
        if self.dry_run {
            info!(command = %line, "dry-run: not executing");
            return Ok(None);
        }

        debug!(command = %line, "running");
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VaultClientError::BackendFailed(format!("failed to run '{line}': {e}")))?;
        debug!(status = ?output.status.code(), "finished");
        Ok(Some(output))
    }

    /// Spawn `cmd` with all three standard streams piped.
    ///
    /// Returns `None` in dry-run mode.
    pub fn spawn(&self, cmd: &mut Command) -> Result<Option<Child>> {
        let line = render(cmd);
        if self.dry_run {
            info!(command = %line, "dry-run: not executing");
            return Ok(None);
        }

        debug!(command = %line, "spawning");
        let child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                VaultClientError::BackendFailed(format!("failed to start '{line}': {e}"))
            })?;
        Ok(Some(child))
    }
}

/// Render a command line for logs: program followed by its arguments.
pub fn render(cmd: &Command) -> String {
    let mut line = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        line.push(' ');
        let arg = arg.to_string_lossy();
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('\'');
            line.push_str(&arg);
            line.push('\'');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

/// Disable core dumps so a crash cannot write the unlocked password to disk.
#[cfg(unix)]
pub fn harden() {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: setrlimit only reads the struct we pass in.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) };
    if rc != 0 {
        debug!("could not disable core dumps");
    }
}

#[cfg(not(unix))]
pub fn harden() {}
