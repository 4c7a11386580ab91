//! End-to-end polls over a configuration tree on disk and scripted
//! command output.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use birdagent_common::{AgentError, AgentResult, CommandRunner, ExecResult, Invocation};
use birdagentd::{AgentSettings, AttributeKey, AttributeValue, BirdAgent, Warning};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

const BIRD_CONF: &str = r#"
router id 192.0.2.2;
timeformat protocol iso long;

include "bgp/*.conf";
"#;

const TEMPLATES: &str = r#"
template bgp upstream {
  local as 65000;
  hold time 240;
  keepalive time 80;
}
"#;

const PEERS: &str = r#"
protocol bgp transit_v4 from upstream {
  neighbor 192.0.2.1 as 64500;
}

protocol bgp transit_v6 from upstream {
  neighbor 2001:db8::1 as 64501;
  hold time 90;
}

protocol bgp ix_peer {
  neighbor 198.51.100.7 as 64502;
}

protocol bgp parked {
  neighbor 203.0.113.9 as 64503;
}
"#;

const STATUS: &str = "\
BIRD 2.0.8 ready.
Name       Proto      Table      State  Since         Info
transit_v4 BGP        ---        up     2016-01-01 12:00:00  Established
  BGP state:          Established
    Neighbor address: 192.0.2.1
    Neighbor AS:      64500
    Local AS:         65000
    Neighbor ID:      192.0.2.101
    Source address:   192.0.2.2
    Hold timer:       201.5/240
    Keepalive timer:  33.1/80
  Channel ipv4
    Route change stats:     received   rejected   filtered    ignored   accepted
      Import updates:            420          0          0          0        420
      Export updates:             17          0          0        ---         17

transit_v6 BGP        ---        up     2016-01-01 11:00:00  Established
  BGP state:          Established
    Neighbor address: 2001:db8::1
    Neighbor AS:      64501
    Local AS:         65000
    Source address:   2001:db8::2

ix_peer    BGP        ---        start  2016-01-01 12:59:00  Active
  BGP state:          Active
    Neighbor address: 198.51.100.7
    Neighbor AS:      64502
    Local AS:         65001
    Source address:   198.51.100.2

parked     BGP        ---        down   2016-01-01 09:00:00
  BGP state:          Down
    Neighbor address: 203.0.113.9
    Neighbor AS:      64503
    Local AS:         65000

rogue      BGP        ---        up     2016-01-01 12:00:00  Established
  BGP state:          Established
    Local AS:         1

";

const SOCKETS: &str = "\
0      0      192.0.2.2:51000      192.0.2.1:179
0      0      [2001:db8::2]:179    [2001:db8::1]:40404
0      0      198.51.100.99:179    198.51.100.7:33333
";

struct ScriptedRunner {
    status: String,
    sockets: String,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    fn new(status: &str, sockets: &str) -> Arc<Self> {
        Arc::new(Self {
            status: status.to_string(),
            sockets: sockets.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> AgentResult<ExecResult> {
        self.calls.lock().unwrap().push(invocation.clone());
        let stdout = match invocation {
            Invocation::Argv { .. } => self.status.clone(),
            Invocation::Shell(_) => self.sockets.clone(),
        };
        Ok(ExecResult {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }
}

fn write_tree(dir: &Path, root: &str) {
    fs::create_dir(dir.join("bgp")).unwrap();
    fs::write(dir.join("bird.conf"), root).unwrap();
    fs::write(dir.join("bgp/00-templates.conf"), TEMPLATES).unwrap();
    fs::write(dir.join("bgp/10-peers.conf"), PEERS).unwrap();
}

fn agent(dir: &Path, runner: Arc<ScriptedRunner>) -> BirdAgent {
    let mut settings = AgentSettings::default();
    settings.bird.config_path = dir.join("bird.conf");
    BirdAgent::new(settings, runner)
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn int(value: i64) -> Option<AttributeValue> {
    Some(AttributeValue::Integer(value))
}

#[tokio::test]
async fn test_full_poll() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), BIRD_CONF);
    let runner = ScriptedRunner::new(STATUS, SOCKETS);
    let now = Utc.with_ymd_and_hms(2016, 1, 1, 13, 0, 0).unwrap();

    let report = agent(dir.path(), runner.clone())
        .poll_at(now, &Utc)
        .await
        .unwrap();
    let snapshot = &report.snapshot;

    assert!(snapshot.timeformat_enabled);
    assert_eq!(snapshot.local_as, 65000);
    assert_eq!(runner.call_count(), 2);
    assert_eq!(
        snapshot.peers.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["ix_peer", "parked", "transit_v4", "transit_v6"]
    );

    // Established peer with a matching session
    let v4 = &snapshot.peers["transit_v4"];
    assert_eq!(v4.remote_addr, ip("192.0.2.1"));
    assert_eq!(v4.get(AttributeKey::PeerState).cloned(), int(6));
    assert_eq!(v4.get(AttributeKey::PeerAdminStatus).cloned(), int(2));
    assert_eq!(v4.get(AttributeKey::PeerLocalPort).cloned(), int(51000));
    assert_eq!(v4.get(AttributeKey::PeerRemotePort).cloned(), int(179));
    assert_eq!(v4.get(AttributeKey::PeerHoldTime).cloned(), int(201));
    assert_eq!(v4.get(AttributeKey::PeerHoldTimeConfigured).cloned(), int(240));
    assert_eq!(v4.get(AttributeKey::PeerKeepAliveConfigured).cloned(), int(80));
    assert_eq!(
        v4.get(AttributeKey::PeerInUpdates),
        Some(&AttributeValue::Counter32(420))
    );
    assert_eq!(
        v4.get(AttributeKey::PeerFsmEstablishedTime),
        Some(&AttributeValue::Gauge32(3600))
    );

    // Template values are overridden locally
    let v6 = &snapshot.peers["transit_v6"];
    assert_eq!(v6.remote_addr, ip("2001:db8::1"));
    assert_eq!(v6.get(AttributeKey::PeerHoldTimeConfigured).cloned(), int(90));
    assert_eq!(v6.get(AttributeKey::PeerKeepAliveConfigured).cloned(), int(80));
    assert_eq!(v6.get(AttributeKey::PeerLocalPort).cloned(), int(179));
    assert_eq!(v6.get(AttributeKey::PeerRemotePort).cloned(), int(40404));

    // Session local address disagrees with the daemon
    let ix = &snapshot.peers["ix_peer"];
    assert_eq!(ix.get(AttributeKey::PeerState).cloned(), int(3));
    assert_eq!(ix.get(AttributeKey::PeerLocalPort).cloned(), int(0));
    assert_eq!(ix.get(AttributeKey::PeerRemotePort).cloned(), int(0));

    // Operator-disabled peer without a session
    let parked = &snapshot.peers["parked"];
    assert_eq!(parked.remote_addr, ip("203.0.113.9"));
    assert_eq!(parked.get(AttributeKey::PeerState).cloned(), int(1));
    assert_eq!(parked.get(AttributeKey::PeerAdminStatus).cloned(), int(1));
    assert_eq!(
        parked.get(AttributeKey::PeerFsmEstablishedTime),
        Some(&AttributeValue::Gauge32(0))
    );

    for (name, peer) in &snapshot.peers {
        assert_eq!(peer.attributes.len(), AttributeKey::ALL.len(), "{}", name);
        for key in AttributeKey::ALL {
            assert_eq!(peer.get(key).map(AttributeValue::kind), Some(key.kind()));
        }
    }

    let kinds: Vec<&str> = report
        .warnings
        .iter()
        .map(|w| match w {
            Warning::UnknownProtocol { .. } => "unknown",
            Warning::AddressMismatch { .. } => "mismatch",
            Warning::MultipleLocalAs { .. } => "local_as",
            Warning::FieldConversion { .. } => "field",
            Warning::CommandExitStatus { .. } => "exit",
        })
        .collect();
    assert_eq!(kinds, vec!["unknown", "mismatch", "local_as"]);
}

#[tokio::test]
async fn test_peer_table_order() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), BIRD_CONF);
    let now = Utc.with_ymd_and_hms(2016, 1, 1, 13, 0, 0).unwrap();

    let report = agent(dir.path(), ScriptedRunner::new(STATUS, SOCKETS))
        .poll_at(now, &Utc)
        .await
        .unwrap();
    let order: Vec<&str> = report
        .snapshot
        .peers_by_remote_addr()
        .into_iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(order, vec!["transit_v4", "ix_peer", "parked", "transit_v6"]);
}

#[tokio::test]
async fn test_missing_timeformat_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), "include \"bgp/*.conf\";\n");
    let runner = ScriptedRunner::new(STATUS, SOCKETS);

    let err = agent(dir.path(), runner.clone()).poll().await.unwrap_err();
    assert!(matches!(err, AgentError::TimeformatMissing { .. }));
    assert!(err.is_fatal_config());
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_unreadable_config_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(STATUS, SOCKETS);

    let err = agent(dir.path(), runner.clone()).poll().await.unwrap_err();
    assert!(matches!(err, AgentError::ConfigUnreadable { .. }));
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_no_local_as_fails_poll() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), BIRD_CONF);
    let status = "\
parked     BGP        ---        down   2016-01-01 09:00:00
  BGP state:          Down

";

    let err = agent(dir.path(), ScriptedRunner::new(status, ""))
        .poll()
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NoLocalAs));
}

#[tokio::test]
async fn test_report_serializes() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), BIRD_CONF);
    let now = Utc.with_ymd_and_hms(2016, 1, 1, 13, 0, 0).unwrap();

    let report = agent(dir.path(), ScriptedRunner::new(STATUS, SOCKETS))
        .poll_at(now, &Utc)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["snapshot"]["local_as"], 65000);
    assert_eq!(
        json["snapshot"]["peers"]["transit_v4"]["attributes"]["bgpPeerRemotePort"]["value"],
        179
    );
    assert_eq!(json["warnings"][0]["kind"], "unknown_protocol");
}
