//! Type definitions for birdagentd

use std::collections::BTreeMap;
use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr};

use serde::{Serialize, Serializer};
use tracing::warn;

/// Name of a BGP protocol instance in the bird configuration.
pub type ProtocolName = String;

/// The zero address used when a peer's remote address is unknown.
pub const ZERO_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Canonical peer-table attributes.
///
/// Every variant has a fixed [`AttributeKind`] and a fixed default value;
/// a finished [`PeerSnapshot`] carries a value for each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKey {
    PeerIdentifier,
    PeerState,
    PeerAdminStatus,
    PeerNegotiatedVersion,
    PeerLocalAddr,
    PeerLocalPort,
    PeerRemotePort,
    PeerRemoteAs,
    PeerInUpdates,
    PeerOutUpdates,
    PeerInTotalMessages,
    PeerOutTotalMessages,
    PeerLastError,
    PeerFsmEstablishedTransitions,
    PeerFsmEstablishedTime,
    PeerConnectRetryInterval,
    PeerHoldTime,
    PeerKeepAlive,
    PeerHoldTimeConfigured,
    PeerKeepAliveConfigured,
    PeerMinAsOriginationInterval,
    PeerMinRouteAdvertisementInterval,
    PeerInUpdateElapsedTime,
}

impl AttributeKey {
    /// All canonical keys in peer-table column order.
    pub const ALL: [AttributeKey; 23] = [
        AttributeKey::PeerIdentifier,
        AttributeKey::PeerState,
        AttributeKey::PeerAdminStatus,
        AttributeKey::PeerNegotiatedVersion,
        AttributeKey::PeerLocalAddr,
        AttributeKey::PeerLocalPort,
        AttributeKey::PeerRemotePort,
        AttributeKey::PeerRemoteAs,
        AttributeKey::PeerInUpdates,
        AttributeKey::PeerOutUpdates,
        AttributeKey::PeerInTotalMessages,
        AttributeKey::PeerOutTotalMessages,
        AttributeKey::PeerLastError,
        AttributeKey::PeerFsmEstablishedTransitions,
        AttributeKey::PeerFsmEstablishedTime,
        AttributeKey::PeerConnectRetryInterval,
        AttributeKey::PeerHoldTime,
        AttributeKey::PeerKeepAlive,
        AttributeKey::PeerHoldTimeConfigured,
        AttributeKey::PeerKeepAliveConfigured,
        AttributeKey::PeerMinAsOriginationInterval,
        AttributeKey::PeerMinRouteAdvertisementInterval,
        AttributeKey::PeerInUpdateElapsedTime,
    ];

    /// Returns the peer-table column name.
    pub fn name(&self) -> &'static str {
        match self {
            AttributeKey::PeerIdentifier => "bgpPeerIdentifier",
            AttributeKey::PeerState => "bgpPeerState",
            AttributeKey::PeerAdminStatus => "bgpPeerAdminStatus",
            AttributeKey::PeerNegotiatedVersion => "bgpPeerNegotiatedVersion",
            AttributeKey::PeerLocalAddr => "bgpPeerLocalAddr",
            AttributeKey::PeerLocalPort => "bgpPeerLocalPort",
            AttributeKey::PeerRemotePort => "bgpPeerRemotePort",
            AttributeKey::PeerRemoteAs => "bgpPeerRemoteAs",
            AttributeKey::PeerInUpdates => "bgpPeerInUpdates",
            AttributeKey::PeerOutUpdates => "bgpPeerOutUpdates",
            AttributeKey::PeerInTotalMessages => "bgpPeerInTotalMessages",
            AttributeKey::PeerOutTotalMessages => "bgpPeerOutTotalMessages",
            AttributeKey::PeerLastError => "bgpPeerLastError",
            AttributeKey::PeerFsmEstablishedTransitions => "bgpPeerFsmEstablishedTransitions",
            AttributeKey::PeerFsmEstablishedTime => "bgpPeerFsmEstablishedTime",
            AttributeKey::PeerConnectRetryInterval => "bgpPeerConnectRetryInterval",
            AttributeKey::PeerHoldTime => "bgpPeerHoldTime",
            AttributeKey::PeerKeepAlive => "bgpPeerKeepAlive",
            AttributeKey::PeerHoldTimeConfigured => "bgpPeerHoldTimeConfigured",
            AttributeKey::PeerKeepAliveConfigured => "bgpPeerKeepAliveConfigured",
            AttributeKey::PeerMinAsOriginationInterval => "bgpPeerMinASOriginationInterval",
            AttributeKey::PeerMinRouteAdvertisementInterval => {
                "bgpPeerMinRouteAdvertisementInterval"
            }
            AttributeKey::PeerInUpdateElapsedTime => "bgpPeerInUpdateElapsedTime",
        }
    }

    /// Returns the value tag every value of this key must carry.
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeKey::PeerIdentifier | AttributeKey::PeerLocalAddr => AttributeKind::IpAddress,
            AttributeKey::PeerInUpdates
            | AttributeKey::PeerOutUpdates
            | AttributeKey::PeerInTotalMessages
            | AttributeKey::PeerOutTotalMessages
            | AttributeKey::PeerFsmEstablishedTransitions => AttributeKind::Counter32,
            AttributeKey::PeerFsmEstablishedTime | AttributeKey::PeerInUpdateElapsedTime => {
                AttributeKind::Gauge32
            }
            AttributeKey::PeerLastError => AttributeKind::OctetString,
            _ => AttributeKind::Integer,
        }
    }

    /// Returns the value used when no source supplied one.
    pub fn default_value(&self) -> AttributeValue {
        match self {
            AttributeKey::PeerIdentifier | AttributeKey::PeerLocalAddr => {
                AttributeValue::IpAddress(ZERO_ADDRESS)
            }
            AttributeKey::PeerState => AttributeValue::Integer(BgpState::Idle.code()),
            AttributeKey::PeerAdminStatus => AttributeValue::Integer(AdminStatus::Start.code()),
            AttributeKey::PeerLastError => AttributeValue::OctetString("0".to_string()),
            AttributeKey::PeerMinAsOriginationInterval => AttributeValue::Integer(15),
            AttributeKey::PeerMinRouteAdvertisementInterval => AttributeValue::Integer(30),
            key => match key.kind() {
                AttributeKind::Counter32 => AttributeValue::Counter32(0),
                AttributeKind::Gauge32 => AttributeValue::Gauge32(0),
                _ => AttributeValue::Integer(0),
            },
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for AttributeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Value tag of an [`AttributeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    IpAddress,
    Counter32,
    Gauge32,
    Integer,
    OctetString,
}

/// A typed peer-table value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    IpAddress(IpAddr),
    /// Monotonic counter, wraps at 2^32.
    Counter32(u32),
    /// Gauge, latches at its maximum.
    Gauge32(u32),
    Integer(i64),
    OctetString(String),
}

impl AttributeValue {
    /// Returns the value's tag.
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::IpAddress(_) => AttributeKind::IpAddress,
            AttributeValue::Counter32(_) => AttributeKind::Counter32,
            AttributeValue::Gauge32(_) => AttributeKind::Gauge32,
            AttributeValue::Integer(_) => AttributeKind::Integer,
            AttributeValue::OctetString(_) => AttributeKind::OctetString,
        }
    }

    /// Builds a counter from an arbitrarily large cumulative count.
    pub fn counter(count: u64) -> Self {
        AttributeValue::Counter32((count % (1u64 << 32)) as u32)
    }

    /// Builds a gauge, saturating at `u32::MAX`.
    pub fn gauge(value: u64) -> Self {
        AttributeValue::Gauge32(u32::try_from(value).unwrap_or(u32::MAX))
    }

    /// Returns the address if this is an address value.
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            AttributeValue::IpAddress(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Returns the numeric content of integer, counter and gauge values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(v) => Some(*v),
            AttributeValue::Counter32(v) | AttributeValue::Gauge32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::IpAddress(addr) => write!(f, "{}", addr),
            AttributeValue::Counter32(v) | AttributeValue::Gauge32(v) => write!(f, "{}", v),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::OctetString(s) => f.write_str(s),
        }
    }
}

/// BGP finite-state-machine state (bgpPeerState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BgpState {
    Idle = 1,
    Connect = 2,
    Active = 3,
    OpenSent = 4,
    OpenConfirm = 5,
    Established = 6,
}

impl BgpState {
    /// Parses a state name as printed by bird, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "connect" => Some(Self::Connect),
            "active" => Some(Self::Active),
            "opensent" => Some(Self::OpenSent),
            "openconfirm" => Some(Self::OpenConfirm),
            "established" => Some(Self::Established),
            _ => None,
        }
    }

    /// Returns the peer-table encoding.
    pub fn code(&self) -> i64 {
        *self as i64
    }
}

/// Administrative status (bgpPeerAdminStatus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminStatus {
    /// Disabled by the operator.
    Stop = 1,
    Start = 2,
}

impl AdminStatus {
    /// Returns the peer-table encoding.
    pub fn code(&self) -> i64 {
        *self as i64
    }
}

/// Parses an address as printed by bird or ss.
///
/// Accepts surrounding brackets and a `%zone` suffix (inside or outside
/// the brackets); IPv4-mapped IPv6 addresses come back as IPv4.
pub fn parse_ip(text: &str) -> Result<IpAddr, AddrParseError> {
    let text = text.trim();
    let text = text.strip_prefix('[').unwrap_or(text);
    let text = match text.find(|c: char| c == '%' || c == ']') {
        Some(end) => &text[..end],
        None => text,
    };
    text.parse::<IpAddr>().map(|addr| addr.to_canonical())
}

/// Statically configured values for one BGP protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticPeerConfig {
    /// `hold time N;`
    pub hold_time: Option<u32>,
    /// `keepalive time N;`
    pub keepalive_time: Option<u32>,
    /// Address from `neighbor <addr> as <asn>;`
    pub remote_addr: Option<IpAddr>,
    /// AS number from `neighbor <addr> as <asn>;`
    pub remote_as: Option<u32>,
    /// Template named by `from <template>`.
    pub template: Option<String>,
}

impl StaticPeerConfig {
    /// Fills every unset value from `base`.
    pub fn inherit(&mut self, base: &StaticPeerConfig) {
        self.hold_time = self.hold_time.or(base.hold_time);
        self.keepalive_time = self.keepalive_time.or(base.keepalive_time);
        self.remote_addr = self.remote_addr.or(base.remote_addr);
        self.remote_as = self.remote_as.or(base.remote_as);
    }
}

/// Everything the agent takes from the bird configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticConfig {
    /// Whether `timeformat protocol iso long;` is present.
    pub timeformat_enabled: bool,
    /// BGP protocols by name (templates already applied).
    pub peers: BTreeMap<ProtocolName, StaticPeerConfig>,
}

/// Per-peer state gathered from the daemon, before reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerRecord {
    attributes: BTreeMap<AttributeKey, AttributeValue>,
    /// Neighbor address as reported by the daemon.
    pub remote_addr: Option<IpAddr>,
    /// Local AS number as reported by the daemon.
    pub local_as: Option<u32>,
}

impl PeerRecord {
    /// Creates a record seeded with the configured values of a protocol.
    pub fn seeded(config: &StaticPeerConfig) -> Self {
        let mut record = Self::default();
        if let Some(hold) = config.hold_time {
            record.set(
                AttributeKey::PeerHoldTimeConfigured,
                AttributeValue::Integer(i64::from(hold)),
            );
        }
        if let Some(keepalive) = config.keepalive_time {
            record.set(
                AttributeKey::PeerKeepAliveConfigured,
                AttributeValue::Integer(i64::from(keepalive)),
            );
        }
        if let Some(asn) = config.remote_as {
            record.set(
                AttributeKey::PeerRemoteAs,
                AttributeValue::Integer(i64::from(asn)),
            );
        }
        record
    }

    /// Returns the value recorded for `key`, if any.
    pub fn get(&self, key: AttributeKey) -> Option<&AttributeValue> {
        self.attributes.get(&key)
    }

    /// Records a value.
    ///
    /// A value whose tag does not match the key's declared kind is dropped.
    pub fn set(&mut self, key: AttributeKey, value: AttributeValue) {
        if value.kind() != key.kind() {
            warn!(key = %key, kind = ?value.kind(), "Dropping value of the wrong kind");
            return;
        }
        self.attributes.insert(key, value);
    }

    /// Returns the local address reported by the daemon.
    pub fn local_addr(&self) -> Option<IpAddr> {
        self.get(AttributeKey::PeerLocalAddr).and_then(AttributeValue::as_ip)
    }
}

/// Kernel socket 4-tuple of a BGP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionTuple {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

/// Final, fully populated state of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSnapshot {
    /// Peer-table index.
    pub remote_addr: IpAddr,
    /// Values for every canonical key.
    pub attributes: BTreeMap<AttributeKey, AttributeValue>,
}

impl PeerSnapshot {
    /// Builds a snapshot from a record, filling every missing key with its default.
    pub fn complete(remote_addr: IpAddr, record: &PeerRecord) -> Self {
        let attributes = AttributeKey::ALL
            .iter()
            .map(|key| {
                let value = record
                    .get(*key)
                    .cloned()
                    .unwrap_or_else(|| key.default_value());
                (*key, value)
            })
            .collect();
        Self {
            remote_addr,
            attributes,
        }
    }

    /// Returns the value of `key`.
    pub fn get(&self, key: AttributeKey) -> Option<&AttributeValue> {
        self.attributes.get(&key)
    }
}

/// Result of one poll: the reconciled state of all peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub timeformat_enabled: bool,
    /// Local AS representing the whole speaker (bgpLocalAs).
    pub local_as: u32,
    pub peers: BTreeMap<ProtocolName, PeerSnapshot>,
}

impl Snapshot {
    /// Iterates peers in peer-table index order: by remote address, IPv4 before IPv6.
    pub fn peers_by_remote_addr(&self) -> Vec<(&ProtocolName, &PeerSnapshot)> {
        let mut peers: Vec<_> = self.peers.iter().collect();
        peers.sort_by(|(a_name, a), (b_name, b)| {
            a.remote_addr
                .cmp(&b.remote_addr)
                .then_with(|| a_name.cmp(b_name))
        });
        peers
    }
}
