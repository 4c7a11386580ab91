//! External command execution for the agent.
//!
//! Both text producers the agent depends on are external commands: the
//! routing daemon's control client and a socket-statistics command. This
//! module runs them with a hard timeout so that a wedged command fails the
//! poll instead of stalling the agent forever.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use birdagent_common::shell;
//!
//! let result = shell::exec("ss -ntH", Duration::from_secs(5)).await?;
//! if result.success() {
//!     println!("Output: {}", result.stdout);
//! }
//! ```

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{AgentError, AgentResult};

/// Path to the POSIX shell used for shell-interpreted commands.
pub const SH_CMD: &str = "/bin/sh";

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The stdout output, lossily decoded as UTF-8.
    pub stdout: String,
    /// The stderr output, lossily decoded as UTF-8.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes a shell-interpreted command.
///
/// The command runs through `/bin/sh -c` so that pipes, quoting and
/// redirects in operator-supplied command lines behave as written.
///
/// # Returns
///
/// * `Ok(ExecResult)` - The command ran to completion (any exit code)
/// * `Err(AgentError::CommandSpawn)` - The command could not be spawned
/// * `Err(AgentError::CommandTimeout)` - The command did not exit in time
pub async fn exec(cmd: &str, timeout: Duration) -> AgentResult<ExecResult> {
    let mut command = Command::new(SH_CMD);
    command.arg("-c").arg(cmd);
    run(command, cmd, timeout).await
}

/// Executes a program directly with an argument vector (no shell).
pub async fn exec_argv(program: &str, args: &[&str], timeout: Duration) -> AgentResult<ExecResult> {
    let mut command = Command::new(program);
    command.args(args);
    let display = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    run(command, &display, timeout).await
}

async fn run(mut command: Command, cmdline: &str, timeout: Duration) -> AgentResult<ExecResult> {
    tracing::debug!(command = %cmdline, timeout_secs = timeout.as_secs_f64(), "Executing command");

    // The child is killed when the output future is dropped on timeout.
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(output) => output.map_err(|e| AgentError::CommandSpawn {
            command: cmdline.to_string(),
            source: e,
        })?,
        Err(_) => {
            tracing::warn!(command = %cmdline, "Command timed out");
            return Err(AgentError::CommandTimeout {
                command: cmdline.to_string(),
                timeout,
            });
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let result = ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %cmdline, bytes = result.stdout.len(), "Command succeeded");
    } else {
        tracing::debug!(
            command = %cmdline,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command exited non-zero"
        );
    }

    Ok(result)
}
