// SPDX-License-Identifier: Apache-2.0

//! Subprocess runner for the developer CLI sources.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::AuthError;

/// Default time a developer CLI may take to print a token.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub(crate) success: bool,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Runs `program` with `args`, killing it if `timeout` elapses or the
/// returned future is dropped.
///
/// A missing executable and a timeout are reported as
/// [`AuthError::Unavailable`].
#[instrument(skip(args), fields(program = %program))]
pub(crate) async fn run(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<ProcessOutput, AuthError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| match source.kind() {
            ErrorKind::NotFound => {
                AuthError::unavailable(format!("'{program}' was not found on the PATH"))
            }
            _ => AuthError::Process {
                program: program.to_string(),
                source,
            },
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| AuthError::Process {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            debug!(timeout_secs = timeout.as_secs(), "Subprocess timed out");
            return Err(AuthError::unavailable(format!(
                "'{program}' did not return a token within {} seconds",
                timeout.as_secs()
            )));
        }
    };

    Ok(ProcessOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
