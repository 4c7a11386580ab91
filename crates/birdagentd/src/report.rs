//! Recoverable findings of a poll.
//!
//! A warning never stops a poll. Each one is logged when it is recorded and
//! handed back to the caller together with the snapshot it qualifies.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;
use tracing::warn;

use crate::types::{ProtocolName, Snapshot};

/// A condition that degraded, but did not abort, a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The daemon reported a protocol that the configuration does not define.
    UnknownProtocol { protocol: ProtocolName },

    /// A single field's text could not be converted to its type.
    FieldConversion {
        protocol: ProtocolName,
        field: &'static str,
        text: String,
        reason: String,
    },

    /// Peers disagree on the local AS number.
    MultipleLocalAs { values: Vec<u32>, chosen: u32 },

    /// The socket table disagrees with the daemon about a session's addresses.
    AddressMismatch {
        protocol: ProtocolName,
        daemon_local: Option<IpAddr>,
        daemon_remote: IpAddr,
        session_local: IpAddr,
        session_remote: IpAddr,
    },

    /// An external command ran but exited non-zero; its output was used anyway.
    CommandExitStatus {
        command: String,
        exit_code: i32,
        stderr: String,
    },
}

fn fmt_opt(addr: &Option<IpAddr>) -> String {
    addr.map_or_else(|| "unknown".to_string(), |a| a.to_string())
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnknownProtocol { protocol } => {
                write!(f, "proto \"{}\" not in config, skipping", protocol)
            }
            Warning::FieldConversion {
                protocol,
                field,
                text,
                reason,
            } => write!(
                f,
                "Unable to process \"{}\" as \"{}\" for protocol \"{}\": {}",
                text, field, protocol, reason
            ),
            Warning::MultipleLocalAs { values, chosen } => {
                let values: Vec<String> = values.iter().map(u32::to_string).collect();
                write!(f, "multiple local AS: {}; using {}", values.join(", "), chosen)
            }
            Warning::AddressMismatch {
                protocol,
                daemon_local,
                daemon_remote,
                session_local,
                session_remote,
            } => write!(
                f,
                "Protocol \"{}\" has mismatch between the daemon (local: {}, neighbor: {}) \
                 and the active BGP session (local: {}, neighbor: {})",
                protocol,
                fmt_opt(daemon_local),
                daemon_remote,
                session_local,
                session_remote
            ),
            Warning::CommandExitStatus {
                command,
                exit_code,
                stderr,
            } => write!(
                f,
                "Command \"{}\" exited with status {}: {}",
                command, exit_code, stderr
            ),
        }
    }
}

/// Accumulates warnings for one poll, logging each as it arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings {
    items: Vec<Warning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs and records a warning.
    pub fn push(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.items.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Warning> {
        self.items
    }
}

/// Outcome of a successful poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub snapshot: Snapshot,
    pub warnings: Vec<Warning>,
}
