//! BGP peer state agent for the bird routing daemon
//!
//! Periodically reconciles three views of the BGP speaker into one
//! peer-table snapshot: the bird configuration tree (with includes and
//! templates), the daemon's `show protocols all` dump, and the kernel's
//! socket table. The snapshot carries every canonical peer attribute for
//! every peer, ready to be served by a monitoring frontend.

pub mod agent;
pub mod commands;
pub mod config_resolver;
pub mod peer_state;
pub mod reconciler;
pub mod report;
pub mod settings;
pub mod socket_table;
mod tables;
pub mod types;

pub use agent::{report_channel, BirdAgent, ReportReceiver, ReportSender};
pub use report::{PollReport, Warning, Warnings};
pub use settings::{AgentSettings, SettingsOverrides, DEFAULT_SETTINGS_PATH};
pub use types::*;
