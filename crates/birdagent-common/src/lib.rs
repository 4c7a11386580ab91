//! Common infrastructure for the bird BGP monitoring agent.
//!
//! This crate provides the pieces of the agent that do not know anything
//! about BGP itself:
//!
//! - [`error`]: Error taxonomy shared by every stage of a poll
//! - [`shell`]: External command execution with timeouts
//! - [`runner`]: The [`CommandRunner`] seam through which the agent obtains
//!   the routing daemon's status dump and the kernel socket table
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use birdagent_common::{shell, AgentResult};
//!
//! async fn socket_table() -> AgentResult<String> {
//!     let result = shell::exec("ss -ntH", Duration::from_secs(5)).await?;
//!     Ok(result.stdout)
//! }
//! ```

pub mod error;
pub mod runner;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{AgentError, AgentResult};
pub use runner::{CommandRunner, Invocation, ShellRunner};
pub use shell::ExecResult;
