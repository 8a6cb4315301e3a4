//! External tool execution
//!
//! Transfers are delegated to the registry and object-store CLIs. Every
//! invocation goes through [`run_tool`] so timeouts, spawn failures and exit
//! codes are mapped to the same error kinds everywhere.

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use strata_common::{Error, Result};
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout for tool presence checks
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a command to completion, optionally bounded by `timeout`.
///
/// Returns the output whatever the exit status; only spawn failures and
/// timeouts are errors here. A timed-out child is killed.
pub(crate) async fn run_tool(
    cmd: &mut Command,
    operation: &str,
    timeout: Option<Duration>,
) -> Result<Output> {
    cmd.kill_on_drop(true);
    debug!(operation = %operation, command = ?cmd.as_std(), "Running tool");

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| {
                warn!(operation = %operation, timeout = ?limit, "Tool timed out");
                Error::transfer(operation, format!("timed out after {:?}", limit))
            })?,
        None => cmd.output().await,
    };

    output.map_err(|e| Error::transfer_permanent(operation, format!("failed to execute: {}", e)))
}

/// Map a finished tool's exit status to a result.
///
/// Exit codes listed in `tolerated` count as success with a warning.
/// Returns captured stdout on success.
pub(crate) fn check_status(operation: &str, output: &Output, tolerated: &[i32]) -> Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(code) if tolerated.contains(&code) => {
            warn!(
                operation = %operation,
                code,
                stderr = %stderr,
                "Tool reported skipped items, continuing"
            );
            Ok(stdout)
        }
        code => {
            let status = code
                .map(|c| format!("exit status {}", c))
                .unwrap_or_else(|| "terminated by signal".to_string());
            let message = if stderr.is_empty() {
                status
            } else {
                format!("{}: {}", status, stderr)
            };
            Err(Error::transfer(operation, message))
        }
    }
}

/// Checks that an external tool is installed and runnable
#[async_trait]
pub trait ToolProbe: Send + Sync {
    /// Fail with a precondition error if `tool` cannot be run
    async fn check(&self, tool: &str) -> Result<()>;
}

/// Probes tools by running `<tool> --version` from `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct PathToolProbe;

#[async_trait]
impl ToolProbe for PathToolProbe {
    async fn check(&self, tool: &str) -> Result<()> {
        let mut cmd = Command::new(tool);
        cmd.arg("--version");
        let output = run_tool(&mut cmd, "probe", Some(PROBE_TIMEOUT))
            .await
            .map_err(|e| {
                Error::precondition(format!("required tool '{}' is not available: {}", tool, e))
            })?;
        if !output.status.success() {
            return Err(Error::precondition(format!(
                "required tool '{}' failed its version check",
                tool
            )));
        }
        debug!(tool = %tool, "Tool available");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn success_returns_stdout() {
        let out = output(0, "listing", "");
        assert_eq!(check_status("list", &out, &[]).unwrap(), "listing");
    }

    #[test]
    fn tolerated_code_is_success() {
        let out = output(2, "", "warning: skipping file");
        assert!(check_status("mirror", &out, &[2]).is_ok());
    }

    #[test]
    fn failure_is_retryable_transfer_error() {
        let out = output(1, "", "upload failed: connection reset");
        let err = check_status("mirror", &out, &[2]).unwrap_err();
        assert!(err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("exit status 1"));
        assert!(msg.contains("connection reset"));
    }

    #[tokio::test]
    async fn missing_tool_fails_precondition() {
        let err = PathToolProbe
            .check("strata-definitely-not-a-real-tool")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition { .. }));
    }

    #[tokio::test]
    async fn spawn_failure_is_permanent() {
        let mut cmd = Command::new("strata-definitely-not-a-real-tool");
        let err = run_tool(&mut cmd, "fetch", None).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn timeout_is_retryable() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_tool(&mut cmd, "mirror", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }
}
