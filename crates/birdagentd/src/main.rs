//! birdagentd - BGP peer state agent for bird
//!
//! Polls the bird configuration, `birdc` and the socket table and keeps a
//! reconciled peer-table snapshot up to date.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use birdagentd::{report_channel, AgentSettings, BirdAgent, SettingsOverrides, DEFAULT_SETTINGS_PATH};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// BGP peer state agent for the bird routing daemon
#[derive(Parser, Debug)]
#[command(name = "birdagentd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent settings file
    #[arg(short = 's', long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// bird configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// birdc binary
    #[arg(long)]
    birdc: Option<String>,

    /// Shell command listing established BGP sessions
    #[arg(long)]
    ss_command: Option<String>,

    /// Poll interval in seconds
    #[arg(short = 'i', long)]
    interval: Option<u64>,

    /// External command timeout in seconds
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Poll once, print the snapshot as JSON and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            config_path: self.config.clone(),
            birdc: self.birdc.clone(),
            ss_command: self.ss_command.clone(),
            interval_secs: self.interval,
            command_timeout_secs: self.timeout,
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(args: &Args) -> anyhow::Result<AgentSettings> {
    let mut settings = AgentSettings::load_or_default(&args.settings)
        .with_context(|| format!("loading {}", args.settings.display()))?;
    settings.apply(args.overrides());
    settings.validate()?;
    Ok(settings)
}

async fn poll_once(agent: &BirdAgent) -> anyhow::Result<()> {
    let report = agent.poll().await?;
    let json = serde_json::to_string_pretty(&report).context("serializing snapshot")?;
    println!("{}", json);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid settings: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("--- Starting birdagentd ---");
    let agent = BirdAgent::with_shell_runner(settings);

    if args.once {
        return match poll_once(&agent).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Poll failed: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    let (publisher, _reports) = report_channel();
    agent.run(publisher, shutdown_signal()).await;

    info!("birdagentd exiting");
    ExitCode::SUCCESS
}
