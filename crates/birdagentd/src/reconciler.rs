//! Merging of static, daemon and socket views into one snapshot.

use std::collections::{BTreeMap, BTreeSet};

use birdagent_common::{AgentError, AgentResult};
use tracing::{debug, info};

use crate::peer_state::DynamicPeers;
use crate::report::{Warning, Warnings};
use crate::types::{
    AttributeKey, AttributeValue, PeerRecord, PeerSnapshot, ProtocolName, SessionTuple, Snapshot,
    StaticConfig, ZERO_ADDRESS,
};

/// Copies a matched session's ports into `record`.
///
/// Returns false, leaving the record untouched, when the session's
/// addresses disagree with what the daemon reported. A daemon record
/// without a local address adopts the session's.
fn apply_session(
    name: &str,
    record: &mut PeerRecord,
    session: &SessionTuple,
    warnings: &mut Warnings,
) -> bool {
    let daemon_local = record.local_addr();
    let daemon_remote = record.remote_addr.unwrap_or(ZERO_ADDRESS);
    let local_mismatch = daemon_local.is_some_and(|addr| addr != session.local_addr);
    if local_mismatch || daemon_remote != session.remote_addr {
        warnings.push(Warning::AddressMismatch {
            protocol: name.to_string(),
            daemon_local,
            daemon_remote,
            session_local: session.local_addr,
            session_remote: session.remote_addr,
        });
        return false;
    }

    if daemon_local.is_none() {
        record.set(
            AttributeKey::PeerLocalAddr,
            AttributeValue::IpAddress(session.local_addr),
        );
    }
    record.set(
        AttributeKey::PeerLocalPort,
        AttributeValue::Integer(i64::from(session.local_port)),
    );
    record.set(
        AttributeKey::PeerRemotePort,
        AttributeValue::Integer(i64::from(session.remote_port)),
    );
    true
}

/// Picks the local AS that represents the whole speaker.
///
/// The smallest observed value wins; disagreement is reported.
fn representative_local_as(peers: &DynamicPeers, warnings: &mut Warnings) -> AgentResult<u32> {
    let observed: BTreeSet<u32> = peers.values().filter_map(|record| record.local_as).collect();
    let chosen = *observed.first().ok_or(AgentError::NoLocalAs)?;
    if observed.len() > 1 {
        warnings.push(Warning::MultipleLocalAs {
            values: observed.into_iter().collect(),
            chosen,
        });
    }
    Ok(chosen)
}

/// Builds the final snapshot.
///
/// Works on copies of the daemon records; the inputs are left untouched.
/// Fails with [`AgentError::NoLocalAs`] when no peer reported a local AS.
pub fn build(
    static_cfg: &StaticConfig,
    dynamic: &DynamicPeers,
    sessions: &BTreeMap<ProtocolName, SessionTuple>,
    warnings: &mut Warnings,
) -> AgentResult<Snapshot> {
    let mut peers = BTreeMap::new();

    for (name, record) in dynamic {
        let mut record = record.clone();

        let remote_addr = match sessions.get(name) {
            Some(session) => {
                if apply_session(name, &mut record, session, warnings) {
                    debug!(
                        protocol = %name,
                        local_port = session.local_port,
                        remote_port = session.remote_port,
                        "Populated session ports"
                    );
                }
                record.remote_addr.unwrap_or(ZERO_ADDRESS)
            }
            None => {
                info!(protocol = %name, "Protocol has no active BGP session");
                record
                    .remote_addr
                    .or_else(|| {
                        static_cfg
                            .peers
                            .get(name)
                            .and_then(|config| config.remote_addr)
                    })
                    .unwrap_or(ZERO_ADDRESS)
            }
        };

        peers.insert(name.clone(), (remote_addr, record));
    }

    let local_as = representative_local_as(dynamic, warnings)?;

    let peers = peers
        .into_iter()
        .map(|(name, (remote_addr, record))| (name, PeerSnapshot::complete(remote_addr, &record)))
        .collect();

    Ok(Snapshot {
        timeformat_enabled: static_cfg.timeformat_enabled,
        local_as,
        peers,
    })
}
