//! Blocking subprocess invocation shared by the git, heroku and shell clients.
//!
//! Every call waits for the child to exit. Output is captured as one string
//! (stdout followed by stderr) and a non-zero exit becomes
//! [`FlashpointError::Subprocess`] carrying that output.

use crate::error::{FlashpointError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Locate `program` on PATH.
pub fn resolve_program(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|_| FlashpointError::CommandNotFound(program.to_string()))
}

/// Run `program args...` and return its combined output.
pub fn run(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let description = describe(program, args);
    run_described(program, args, cwd, &description)
}

/// Like [`run`], but reports failures with `description` instead of the full
/// argument list (used when arguments carry secrets).
pub fn run_described(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    description: &str,
) -> Result<String> {
    let bin = resolve_program(program)?;
    let mut cmd = Command::new(bin);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!(command = %description, cwd = ?cwd, "running");
    let output = cmd.output().map_err(|e| FlashpointError::Subprocess {
        command: description.to_string(),
        output: e.to_string(),
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(FlashpointError::Subprocess {
            command: description.to_string(),
            output: combined.trim().to_string(),
        });
    }
    Ok(combined)
}

pub fn describe(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program];
    parts.extend_from_slice(args);
    parts.join(" ")
}
