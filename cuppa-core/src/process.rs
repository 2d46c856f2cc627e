//! Helpers for driving external command-line tools.
//!
//! Everything cuppa does ultimately shells out to `oc`, `docker`, `fhc`
//! or a handful of system utilities. Commands run sequentially and
//! errors carry the rendered command line for diagnosis.

use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CuppaError, Result};

/// Hard deadline for short-lived calls that authenticate against the
/// cluster. Keeps a wedged API server from hanging the whole run.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Render a command line for logs and error messages.
pub fn describe(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    let mut rendered = std_cmd.get_program().to_string_lossy().into_owned();
    for arg in std_cmd.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

/// Run a command to completion, capturing stdout. Non-zero exit is an
/// error carrying the command's stderr.
pub async fn run_captured(cmd: &mut Command) -> Result<String> {
    let command = describe(cmd);
    debug!(%command, "Running command (captured)");

    let output = cmd.output().await.map_err(|e| CuppaError::CommandFailed {
        command: command.clone(),
        message: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(CuppaError::CommandFailed {
            command,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command with stdio inherited from the parent, so the tool's
/// own progress output stays visible.
pub async fn run_interactive(cmd: &mut Command) -> Result<()> {
    let command = describe(cmd);
    debug!(%command, "Running command");

    let status = cmd.status().await.map_err(|e| CuppaError::CommandFailed {
        command: command.clone(),
        message: e.to_string(),
    })?;

    if !status.success() {
        return Err(CuppaError::CommandFailed {
            command,
            message: format!("exited with {status}"),
        });
    }

    Ok(())
}

/// Run a command with inherited stdio, killing it once the deadline
/// passes.
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<()> {
    let command = describe(cmd);
    debug!(%command, ?timeout, "Running command (bounded)");

    let mut child = cmd.spawn().map_err(|e| CuppaError::CommandFailed {
        command: command.clone(),
        message: e.to_string(),
    })?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(CuppaError::CommandFailed {
            command,
            message: format!("exited with {status}"),
        }),
        Ok(Err(e)) => Err(CuppaError::CommandFailed {
            command,
            message: e.to_string(),
        }),
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(CuppaError::CommandTimeout { command, timeout })
        }
    }
}

/// Locate a binary by asking `which`, falling back to a list of
/// well-known install locations.
pub fn find_binary(name: &str, well_known: &[&str], hint: &str) -> Result<PathBuf> {
    if let Ok(output) = std::process::Command::new("which").arg(name).output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
    }

    for candidate in well_known {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(CuppaError::BinaryNotFound {
        name: name.to_string(),
        hint: hint.to_string(),
    })
}
