//! Settings file support for birdagentd
//!
//! Loads and validates agent settings from TOML files.
//! Default location: /etc/birdagent/birdagent.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use birdagent_common::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::{DEFAULT_BIRDC, DEFAULT_SS_COMMAND};
use crate::config_resolver::DEFAULT_MAX_INCLUDE_DEPTH;

/// Default settings file location
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/birdagent/birdagent.toml";

/// Routing daemon settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirdSettings {
    /// Root of the bird configuration tree
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Path of the birdc control client
    #[serde(default = "default_birdc")]
    pub birdc: String,
}

/// Socket table settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketTableSettings {
    /// Shell command listing established BGP sessions
    #[serde(default = "default_ss_command")]
    pub command: String,
}

/// Polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Seconds between polls
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Seconds an external command may run before the poll is abandoned
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Maximum nesting of include directives
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

/// Complete agent settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub bird: BirdSettings,

    #[serde(default)]
    pub socket_table: SocketTableSettings,

    #[serde(default)]
    pub poll: PollSettings,
}

/// Values given on the command line; each one replaces the file's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub config_path: Option<PathBuf>,
    pub birdc: Option<String>,
    pub ss_command: Option<String>,
    pub interval_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
}

// Default functions
fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/bird/bird.conf")
}

fn default_birdc() -> String {
    DEFAULT_BIRDC.to_string()
}

fn default_ss_command() -> String {
    DEFAULT_SS_COMMAND.to_string()
}

fn default_interval() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    10
}

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

// Default implementations
impl Default for BirdSettings {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            birdc: default_birdc(),
        }
    }
}

impl Default for SocketTableSettings {
    fn default() -> Self {
        Self {
            command: default_ss_command(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            command_timeout_secs: default_command_timeout(),
            max_include_depth: default_max_include_depth(),
        }
    }
}

impl AgentSettings {
    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> AgentResult<Self> {
        toml::from_str(content).map_err(|e| AgentError::SettingsParse(e.to_string()))
    }

    /// Load settings from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                AgentError::SettingsParse(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Settings file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(AgentError::Io(e)),
        }
    }

    /// Replace file values with command-line values
    pub fn apply(&mut self, overrides: SettingsOverrides) {
        if let Some(path) = overrides.config_path {
            self.bird.config_path = path;
        }
        if let Some(birdc) = overrides.birdc {
            self.bird.birdc = birdc;
        }
        if let Some(command) = overrides.ss_command {
            self.socket_table.command = command;
        }
        if let Some(secs) = overrides.interval_secs {
            self.poll.interval_secs = secs;
        }
        if let Some(secs) = overrides.command_timeout_secs {
            self.poll.command_timeout_secs = secs;
        }
    }

    /// Get poll interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    /// Get command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.poll.command_timeout_secs)
    }

    /// Validate settings
    pub fn validate(&self) -> AgentResult<()> {
        if self.bird.config_path.as_os_str().is_empty() {
            return Err(AgentError::invalid_settings(
                "bird.config_path",
                "must not be empty",
            ));
        }

        if self.bird.birdc.trim().is_empty() {
            return Err(AgentError::invalid_settings("bird.birdc", "must not be empty"));
        }

        if self.socket_table.command.trim().is_empty() {
            return Err(AgentError::invalid_settings(
                "socket_table.command",
                "must not be empty",
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(AgentError::invalid_settings(
                "poll.interval_secs",
                "must be > 0",
            ));
        }

        if self.poll.command_timeout_secs == 0 {
            return Err(AgentError::invalid_settings(
                "poll.command_timeout_secs",
                "must be > 0",
            ));
        }

        if self.poll.max_include_depth == 0 {
            return Err(AgentError::invalid_settings(
                "poll.max_include_depth",
                "must be > 0",
            ));
        }

        Ok(())
    }
}
