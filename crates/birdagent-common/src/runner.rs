//! Command runner trait and the production shell-backed implementation.
//!
//! The agent never spawns processes directly; it describes what it wants
//! as an [`Invocation`] and hands it to a [`CommandRunner`]. Tests swap in
//! a scripted runner to replay captured daemon and socket-table output.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AgentResult;
use crate::shell::{self, ExecResult};

/// A command the agent needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run a program directly with an argument vector.
    Argv {
        /// Program path.
        program: String,
        /// Program arguments.
        args: Vec<String>,
    },
    /// Run a command line through the shell.
    Shell(String),
}

impl Invocation {
    /// Creates a direct program invocation.
    pub fn argv<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Argv {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a shell-interpreted invocation.
    pub fn shell(cmd: impl Into<String>) -> Self {
        Self::Shell(cmd.into())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Argv { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Invocation::Shell(cmd) => write!(f, "{}", cmd),
        }
    }
}

/// Source of external command output.
///
/// # Example
///
/// ```ignore
/// use birdagent_common::{CommandRunner, Invocation, ShellRunner};
///
/// let runner = ShellRunner::new(Duration::from_secs(10));
/// let result = runner.run(&Invocation::shell("ss -ntH")).await?;
/// ```
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the invocation to completion and returns its output.
    ///
    /// A command that runs but exits non-zero is still `Ok`; only failures
    /// to run it at all (spawn error, timeout) are errors.
    async fn run(&self, invocation: &Invocation) -> AgentResult<ExecResult>;
}

/// Runs invocations as real processes with a per-command timeout.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    /// Creates a runner that aborts commands after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, invocation: &Invocation) -> AgentResult<ExecResult> {
        match invocation {
            Invocation::Argv { program, args } => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                shell::exec_argv(program, &args, self.timeout).await
            }
            Invocation::Shell(cmd) => shell::exec(cmd, self.timeout).await,
        }
    }
}
