//! Correlation of kernel socket-table rows with daemon peers.

use std::collections::BTreeMap;

use regex::Captures;
use tracing::debug;

use crate::peer_state::DynamicPeers;
use crate::tables::sockets;
use crate::types::{parse_ip, ProtocolName, SessionTuple};

fn session_from(caps: &Captures<'_>) -> Option<SessionTuple> {
    Some(SessionTuple {
        local_addr: parse_ip(&caps[1]).ok()?,
        local_port: caps[2].parse().ok()?,
        remote_addr: parse_ip(&caps[3]).ok()?,
        remote_port: caps[4].parse().ok()?,
    })
}

/// Extracts the session 4-tuples from socket-table output, in row order.
///
/// Rows that do not look like a connection (headers, blank lines) or whose
/// addresses or ports do not parse are skipped.
pub fn parse_sessions(output: &str) -> Vec<SessionTuple> {
    output
        .lines()
        .filter_map(|line| {
            let caps = sockets::CONNECTION.captures(line)?;
            let tuple = session_from(&caps);
            if tuple.is_none() {
                debug!(line = %line.trim(), "Skipping unparsable socket row");
            }
            tuple
        })
        .collect()
}

/// Assigns session tuples to peers by remote address.
///
/// A peer without a daemon-reported remote address never matches. When
/// several rows share a peer's remote address the last row wins.
pub fn match_sessions(output: &str, peers: &DynamicPeers) -> BTreeMap<ProtocolName, SessionTuple> {
    let mut matched = BTreeMap::new();
    for tuple in parse_sessions(output) {
        for (name, record) in peers {
            if record.remote_addr == Some(tuple.remote_addr) {
                debug!(protocol = %name, session = ?tuple, "Matched socket row");
                matched.insert(name.clone(), tuple);
            }
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeerRecord;
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn peers(entries: &[(&str, Option<&str>)]) -> DynamicPeers {
        entries
            .iter()
            .map(|(name, addr)| {
                let mut record = PeerRecord::default();
                record.remote_addr = addr.map(ip);
                (name.to_string(), record)
            })
            .collect()
    }

    const SS: &str = "\
0      0      192.0.2.2:40123      192.0.2.1:179
0      0      [2001:db8::2]:179    [2001:db8::1]:51234
0      0      [fe80::2%eth0]:179   [fe80::1%eth0]:40000
0      0      [::ffff:198.51.100.2]:179  [::ffff:198.51.100.1]:33000
";

    #[test]
    fn test_parse_sessions() {
        let sessions = parse_sessions(SS);
        assert_eq!(sessions.len(), 4);
        assert_eq!(
            sessions[0],
            SessionTuple {
                local_addr: ip("192.0.2.2"),
                local_port: 40123,
                remote_addr: ip("192.0.2.1"),
                remote_port: 179,
            }
        );
        assert_eq!(sessions[1].local_port, 179);
        assert_eq!(sessions[1].remote_addr, ip("2001:db8::1"));
        assert_eq!(sessions[2].remote_addr, ip("fe80::1"));
        assert_eq!(sessions[3].remote_addr, ip("198.51.100.1"));
    }

    #[test]
    fn test_parse_sessions_with_state_column_and_header() {
        let output = "\
State  Recv-Q Send-Q Local Address:Port  Peer Address:Port
ESTAB  0      0      192.0.2.2:179       192.0.2.1:45000

";
        let sessions = parse_sessions(output);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].remote_port, 45000);
    }

    #[test]
    fn test_parse_sessions_skips_bad_rows() {
        let output = "\
0 0 192.0.2.2:99999 192.0.2.1:179
0 0 not-an-addr:179 192.0.2.1:179
0 0 192.0.2.2:179 192.0.2.9:40000
";
        let sessions = parse_sessions(output);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].remote_addr, ip("192.0.2.9"));
    }

    #[test]
    fn test_match_by_remote_addr() {
        let peers = peers(&[
            ("v4", Some("192.0.2.1")),
            ("v6", Some("2001:db8::1")),
            ("lonely", Some("203.0.113.1")),
            ("unknown", None),
        ]);
        let matched = match_sessions(SS, &peers);
        assert_eq!(matched.keys().collect::<Vec<_>>(), vec!["v4", "v6"]);
        assert_eq!(matched["v6"].remote_port, 51234);
    }

    #[test]
    fn test_last_row_wins() {
        let output = "\
0 0 192.0.2.2:40001 192.0.2.1:179
0 0 192.0.2.2:40002 192.0.2.1:179
";
        let matched = match_sessions(output, &peers(&[("p", Some("192.0.2.1"))]));
        assert_eq!(matched["p"].local_port, 40002);
    }

    #[test]
    fn test_shared_remote_addr_matches_every_peer() {
        let output = "0 0 192.0.2.2:40001 192.0.2.1:179\n";
        let matched = match_sessions(
            output,
            &peers(&[("a", Some("192.0.2.1")), ("b", Some("192.0.2.1"))]),
        );
        assert_eq!(matched.len(), 2);
        assert_eq!(matched["a"], matched["b"]);
    }

    #[test]
    fn test_empty_output() {
        assert!(match_sessions("", &peers(&[("p", Some("192.0.2.1"))])).is_empty());
    }
}
