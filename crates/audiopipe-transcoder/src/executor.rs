//! Child process execution for the media tools.
//!
//! Executes a command with piped output, a hard timeout, and
//! `kill_on_drop` so an abandoned or timed-out child never outlives its job.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, error};

use crate::error::ToolError;

/// Parameters for one process invocation.
#[derive(Debug, Clone)]
pub struct ExecutionParams {
    /// Executable name or path.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Timeout in seconds.
    pub timeout_seconds: u64,
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

/// Run a command to completion.
///
/// A non-zero exit is returned as [`ToolError::ProcessFailed`] carrying the
/// complete standard error output.
pub async fn run(params: &ExecutionParams) -> Result<CommandOutput, ToolError> {
    let start = Instant::now();
    debug!(command = %params.command, args = ?params.args, "Spawning tool");

    let mut cmd = Command::new(&params.command);
    cmd.args(&params.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &params.working_dir {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|source| ToolError::Spawn {
        command: params.command.clone(),
        source,
    })?;

    let timeout = Duration::from_secs(params.timeout_seconds);
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!(command = %params.command, error = %e, "Failed to collect tool output");
            return Err(ToolError::Io(e));
        }
        Err(_) => {
            error!(
                command = %params.command,
                timeout_seconds = params.timeout_seconds,
                "Tool timed out"
            );
            return Err(ToolError::Timeout(params.timeout_seconds));
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        error!(command = %params.command, exit_code = code, duration_ms, "Tool failed");
        return Err(ToolError::ProcessFailed { code, stderr });
    }

    debug!(command = %params.command, duration_ms, "Tool finished");
    Ok(CommandOutput {
        stdout,
        stderr,
        duration_ms,
    })
}

/// Keep at most `max_bytes` of a diagnostic, dropping from the front.
///
/// Tool errors are usually reported at the end of the output, so the tail
/// is what survives. Output within the limit is returned unchanged.
pub fn truncate_diagnostic(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated]\n{}", &text[start..])
}
