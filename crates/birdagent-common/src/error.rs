//! Error types for agent operations.
//!
//! Every variant here aborts the poll it occurs in. Conditions that only
//! affect a single field or peer are not errors; they are reported as
//! warnings alongside a best-effort snapshot.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that abort a poll.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The routing daemon configuration (or an included file) could not be read.
    #[error("Unable to read configuration file '{}': {source}", path.display())]
    ConfigUnreadable {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The resolved configuration lacks `timeformat protocol iso long;`.
    #[error("timeformat not configured for this agent's use in '{}'", path.display())]
    TimeformatMissing {
        /// The root configuration file.
        path: PathBuf,
    },

    /// Include directives nested deeper than the configured limit.
    #[error("Include nesting deeper than {depth} levels at '{}'", path.display())]
    IncludeDepthExceeded {
        /// The file whose include would exceed the limit.
        path: PathBuf,
        /// The configured depth limit.
        depth: usize,
    },

    /// No peer reported a local AS number.
    #[error("No local AS found in any BGP protocol")]
    NoLocalAs,

    /// Failed to spawn an external command.
    #[error("Failed to execute command '{command}': {source}")]
    CommandSpawn {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// An external command did not finish in time.
    #[error("Command '{command}' timed out after {}s", timeout.as_secs_f64())]
    CommandTimeout {
        /// The command that timed out.
        command: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Agent settings validation error.
    #[error("Invalid setting {field}: {message}")]
    InvalidSettings {
        /// The setting that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Agent settings file could not be parsed.
    #[error("Failed to parse settings: {0}")]
    SettingsParse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AgentError {
    /// Creates a configuration-unreadable error.
    pub fn config_unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ConfigUnreadable {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid settings error.
    pub fn invalid_settings(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors caused by the routing daemon configuration.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            AgentError::ConfigUnreadable { .. }
                | AgentError::TimeformatMissing { .. }
                | AgentError::IncludeDepthExceeded { .. }
                | AgentError::NoLocalAs
        )
    }

    /// Returns true if an external command could not be run to completion.
    pub fn is_command_failure(&self) -> bool {
        matches!(
            self,
            AgentError::CommandSpawn { .. } | AgentError::CommandTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::TimeformatMissing {
            path: PathBuf::from("/etc/bird/bird.conf"),
        };
        assert_eq!(
            err.to_string(),
            "timeformat not configured for this agent's use in '/etc/bird/bird.conf'"
        );
    }

    #[test]
    fn test_command_timeout_display() {
        let err = AgentError::CommandTimeout {
            command: "birdc show protocols all".to_string(),
            timeout: Duration::from_millis(2500),
        };
        assert_eq!(
            err.to_string(),
            "Command 'birdc show protocols all' timed out after 2.5s"
        );
    }

    #[test]
    fn test_config_unreadable() {
        let err = AgentError::config_unreadable(
            "/nonexistent",
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.to_string().contains("/nonexistent"));
        assert!(err.is_fatal_config());
        assert!(!err.is_command_failure());
    }

    #[test]
    fn test_classification() {
        assert!(AgentError::NoLocalAs.is_fatal_config());
        let spawn = AgentError::CommandSpawn {
            command: "ss".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(spawn.is_command_failure());
        assert!(!spawn.is_fatal_config());
        assert!(!AgentError::SettingsParse("bad".to_string()).is_command_failure());
    }
}
