//! Poll pipeline and periodic publishing loop.
//!
//! A poll runs strictly in order: resolve the bird configuration, extract
//! the static view, dump the daemon's protocol state, query the socket
//! table, and reconcile the three. Configuration problems fail the poll
//! before any external command runs.

use std::future::Future;
use std::io;
use std::sync::Arc;

use birdagent_common::{AgentResult, CommandRunner, Invocation, ShellRunner};
use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::commands::{build_bird_status_invocation, build_socket_table_invocation};
use crate::config_resolver::{extract_static_config, resolve_includes};
use crate::report::{PollReport, Warning, Warnings};
use crate::settings::AgentSettings;
use crate::types::StaticConfig;
use crate::{peer_state, reconciler, socket_table};

/// Receiving side of the published snapshots; `None` until the first
/// successful poll.
pub type ReportReceiver = watch::Receiver<Option<Arc<PollReport>>>;

/// Sending side of the published snapshots.
pub type ReportSender = watch::Sender<Option<Arc<PollReport>>>;

/// Creates the channel the agent publishes snapshots on.
pub fn report_channel() -> (ReportSender, ReportReceiver) {
    watch::channel(None)
}

/// BGP peer state agent for one bird instance.
pub struct BirdAgent {
    settings: AgentSettings,
    runner: Arc<dyn CommandRunner>,
}

impl BirdAgent {
    /// Creates an agent that obtains command output from `runner`.
    pub fn new(settings: AgentSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    /// Creates an agent that runs real processes, bounded by the
    /// configured command timeout.
    pub fn with_shell_runner(settings: AgentSettings) -> Self {
        let runner = Arc::new(ShellRunner::new(settings.command_timeout()));
        Self::new(settings, runner)
    }

    /// Resolves the configuration tree and extracts the static view.
    ///
    /// The files are read on the blocking thread pool.
    pub async fn load_static_config(&self) -> AgentResult<StaticConfig> {
        let root = self.settings.bird.config_path.clone();
        let max_depth = self.settings.poll.max_include_depth;
        tokio::task::spawn_blocking(move || {
            let lines = resolve_includes(&root, max_depth)?;
            extract_static_config(lines, &root)
        })
        .await
        .map_err(io::Error::from)?
    }

    /// Runs one command and returns its stdout.
    ///
    /// A non-zero exit is recorded as a warning; the output is still used.
    async fn capture(&self, invocation: &Invocation, warnings: &mut Warnings) -> AgentResult<String> {
        debug!(command = %invocation, "Running command");
        let result = self.runner.run(invocation).await?;
        if !result.success() {
            warnings.push(Warning::CommandExitStatus {
                command: invocation.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr.clone(),
            });
        }
        Ok(result.stdout)
    }

    /// Runs one poll against the current time and the host's timezone.
    pub async fn poll(&self) -> AgentResult<PollReport> {
        self.poll_at(Utc::now(), &Local).await
    }

    /// Runs one poll with an explicit clock.
    ///
    /// Timestamps in the daemon output that carry no zone are read in `tz`.
    pub async fn poll_at<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> AgentResult<PollReport> {
        let mut warnings = Warnings::new();

        let static_cfg = self.load_static_config().await?;
        debug!(protocols = static_cfg.peers.len(), "Loaded static configuration");

        let status_cmd = build_bird_status_invocation(&self.settings.bird.birdc);
        let status = self.capture(&status_cmd, &mut warnings).await?;
        let dynamic = peer_state::parse(&status, &static_cfg, now, tz, &mut warnings);

        let sockets_cmd = build_socket_table_invocation(&self.settings.socket_table.command);
        let sockets = self.capture(&sockets_cmd, &mut warnings).await?;
        let sessions = socket_table::match_sessions(&sockets, &dynamic);

        let snapshot = reconciler::build(&static_cfg, &dynamic, &sessions, &mut warnings)?;
        Ok(PollReport {
            snapshot,
            warnings: warnings.into_vec(),
        })
    }

    /// Polls periodically until `shutdown` completes.
    ///
    /// Each successful poll replaces the published report. A failed poll is
    /// logged and leaves the previous report in place. Polls never overlap;
    /// a poll that overruns its interval delays the next one.
    pub async fn run<F>(&self, publisher: ReportSender, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            config = %self.settings.bird.config_path.display(),
            interval_secs = self.settings.poll.interval_secs,
            "Starting poll loop"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping poll loop");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll().await {
                        Ok(report) => {
                            info!(
                                peers = report.snapshot.peers.len(),
                                local_as = report.snapshot.local_as,
                                warnings = report.warnings.len(),
                                "Poll complete"
                            );
                            publisher.send_replace(Some(Arc::new(report)));
                        }
                        Err(e) => {
                            error!(error = %e, "Poll failed, keeping previous snapshot");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeKey, AttributeValue};
    use async_trait::async_trait;
    use birdagent_common::{AgentError, ExecResult};
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    const BIRD_CONF: &str = "\
timeformat protocol iso long;
protocol bgp uplink {
  neighbor 192.0.2.1 as 65010;
  hold time 240;
}
";

    const STATUS: &str = "\
uplink     BGP        ---        up     2016-01-01 12:00:00  Established
  BGP state:          Established
    Neighbor address: 192.0.2.1
    Local AS:         65000
    Source address:   192.0.2.2

";

    const SS: &str = "0 0 192.0.2.2:40000 192.0.2.1:179\n";

    /// Replays fixed output and records what was asked for.
    struct ScriptedRunner {
        status: ExecResult,
        sockets: Option<ExecResult>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn new(status: &str, sockets: Option<&str>) -> Self {
            Self {
                status: ok(status),
                sockets: sockets.map(ok),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn ok(stdout: &str) -> ExecResult {
        ExecResult {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> AgentResult<ExecResult> {
            self.calls.lock().unwrap().push(invocation.clone());
            match invocation {
                Invocation::Argv { .. } => Ok(self.status.clone()),
                Invocation::Shell(cmd) => {
                    self.sockets
                        .clone()
                        .ok_or_else(|| AgentError::CommandTimeout {
                            command: cmd.clone(),
                            timeout: Duration::from_secs(1),
                        })
                }
            }
        }
    }

    fn agent_for(dir: &tempfile::TempDir, runner: Arc<ScriptedRunner>) -> BirdAgent {
        let mut settings = AgentSettings::default();
        settings.bird.config_path = dir.path().join("bird.conf");
        BirdAgent::new(settings, runner)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 1, 1, 12, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_poll_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bird.conf"), BIRD_CONF).unwrap();
        let runner = Arc::new(ScriptedRunner::new(STATUS, Some(SS)));
        let agent = agent_for(&dir, runner.clone());

        let report = agent.poll_at(now(), &Utc).await.unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.snapshot.local_as, 65000);

        let peer = &report.snapshot.peers["uplink"];
        assert_eq!(peer.remote_addr, "192.0.2.1".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(
            peer.get(AttributeKey::PeerRemotePort),
            Some(&AttributeValue::Integer(179))
        );
        assert_eq!(
            peer.get(AttributeKey::PeerHoldTimeConfigured),
            Some(&AttributeValue::Integer(240))
        );
        assert_eq!(
            peer.get(AttributeKey::PeerRemoteAs),
            Some(&AttributeValue::Integer(65010))
        );
        assert_eq!(
            peer.get(AttributeKey::PeerFsmEstablishedTime),
            Some(&AttributeValue::Gauge32(1800))
        );

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].to_string(), "/usr/sbin/birdc show protocols all");
        assert!(matches!(calls[1], Invocation::Shell(_)));
    }

    #[tokio::test]
    async fn test_load_static_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bird.conf"), BIRD_CONF).unwrap();
        let agent = agent_for(&dir, Arc::new(ScriptedRunner::new(STATUS, Some(SS))));

        let cfg = agent.load_static_config().await.unwrap();
        assert!(cfg.timeformat_enabled);
        assert_eq!(cfg.peers["uplink"].hold_time, Some(240));

        fs::remove_file(dir.path().join("bird.conf")).unwrap();
        let err = agent.load_static_config().await.unwrap_err();
        assert!(matches!(err, AgentError::ConfigUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_config_failure_runs_no_command() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bird.conf"), "protocol bgp p {\n}\n").unwrap();
        let runner = Arc::new(ScriptedRunner::new(STATUS, Some(SS)));
        let agent = agent_for(&dir, runner.clone());

        let err = agent.poll_at(now(), &Utc).await.unwrap_err();
        assert!(matches!(err, AgentError::TimeformatMissing { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_socket_command_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bird.conf"), BIRD_CONF).unwrap();
        let runner = Arc::new(ScriptedRunner::new(STATUS, None));
        let agent = agent_for(&dir, runner);

        let err = agent.poll_at(now(), &Utc).await.unwrap_err();
        assert!(err.is_command_failure());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bird.conf"), BIRD_CONF).unwrap();
        let mut runner = ScriptedRunner::new(STATUS, Some(SS));
        runner.status.exit_code = 1;
        runner.status.stderr = "partial".to_string();
        let agent = agent_for(&dir, Arc::new(runner));

        let report = agent.poll_at(now(), &Utc).await.unwrap();
        assert_eq!(
            report.warnings,
            vec![Warning::CommandExitStatus {
                command: "/usr/sbin/birdc show protocols all".to_string(),
                exit_code: 1,
                stderr: "partial".to_string(),
            }]
        );
        assert!(report.snapshot.peers.contains_key("uplink"));
    }

    #[tokio::test]
    async fn test_run_publishes_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bird.conf"), BIRD_CONF).unwrap();
        let agent = agent_for(&dir, Arc::new(ScriptedRunner::new(STATUS, Some(SS))));

        let (tx, rx) = report_channel();
        let mut published = tx.subscribe();
        let shutdown = async move {
            let _ = published.changed().await;
        };
        agent.run(tx, shutdown).await;

        let report = rx.borrow().clone().unwrap();
        assert!(report.snapshot.peers.contains_key("uplink"));
    }

    #[tokio::test]
    async fn test_run_publishes_nothing_on_failed_poll() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_for(&dir, Arc::new(ScriptedRunner::new(STATUS, Some(SS))));

        let (tx, rx) = report_channel();
        agent
            .run(tx, tokio::time::sleep(Duration::from_millis(100)))
            .await;
        assert!(rx.borrow().is_none());
    }
}
