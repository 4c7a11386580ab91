//! Line grammars for the bird configuration and status output.
//!
//! All grammars are compiled once on first use and never change.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::AttributeKey;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("Invalid regex pattern")
}

/// Configuration file grammars (applied to whitespace-stripped lines).
pub mod config {
    use super::*;

    /// `include "<pattern>";`
    pub static INCLUDE: Lazy<Regex> = Lazy::new(|| compile(r#"^include\s*"([^"]*)".*$"#));

    /// `protocol bgp <name> [from <template>] {`
    pub static PROTOCOL_BEGIN: Lazy<Regex> = Lazy::new(|| {
        compile(r"^protocol\s+bgp\s+([a-zA-Z0-9_]+)(?:\s+from\s+([a-zA-Z0-9_]+))?\s*\{")
    });

    /// `template bgp <name> [from <template>] {`
    pub static TEMPLATE_BEGIN: Lazy<Regex> = Lazy::new(|| {
        compile(r"^template\s+bgp\s+([a-zA-Z0-9_]+)(?:\s+from\s+([a-zA-Z0-9_]+))?\s*\{")
    });

    /// `hold time <N>;`
    pub static HOLD_TIME: Lazy<Regex> = Lazy::new(|| compile(r"^hold\s+time\s+([0-9]+)\s*;"));

    /// `keepalive time <N>;`
    pub static KEEPALIVE_TIME: Lazy<Regex> =
        Lazy::new(|| compile(r"^keepalive\s+time\s+([0-9]+)\s*;"));

    /// `neighbor <addr> [%iface] [port <N>] [as <ASN>] [internal|external];`
    pub static NEIGHBOR: Lazy<Regex> = Lazy::new(|| {
        compile(
            r"^neighbor\s+([0-9A-Fa-f:.\[\]%a-z]+)(?:\s+port\s+[0-9]+)?(?:\s+as\s+([0-9]+))?(?:\s+[^;]*?)?\s*;",
        )
    });

    /// `timeformat protocol iso long;`
    pub static TIMEFORMAT: Lazy<Regex> =
        Lazy::new(|| compile(r"^\s*timeformat\s+protocol\s+iso\s+long\s*;"));

    /// Closing brace of a top-level block.
    pub static BLOCK_END: Lazy<Regex> = Lazy::new(|| compile(r"^\}$"));
}

/// `birdc show protocols all` grammars.
pub mod status {
    use super::*;

    /// Protocol summary line: name, `BGP`, table, state, since-timestamp.
    pub static PROTOCOL_BEGIN: Lazy<Regex> = Lazy::new(|| {
        compile(
            r"^([a-zA-Z0-9_]+)\s+BGP\s+[a-zA-Z0-9_-]+\s+[a-zA-Z0-9]+\s+(\d{4}-\d\d-\d\d[ T]\d\d:\d\d:\d\d(?:\.\d+)?(?:\s?(?:Z|[+-]\d\d:?\d\d))?)",
        )
    });

    /// A blank line ends a protocol's detail block.
    pub static PROTOCOL_END: Lazy<Regex> = Lazy::new(|| compile(r"^\s*$"));

    /// Where a matched field's value goes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FieldTarget {
        /// A canonical peer-table attribute.
        Attribute(AttributeKey),
        /// The neighbor address (peer-table index).
        RemoteAddr,
        /// The per-peer local AS.
        LocalAs,
    }

    /// How a matched field's text becomes a value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Conversion {
        Address,
        Counter,
        /// Seconds, fractional part truncated.
        Timer,
        Integer,
        /// FSM state name, with `down` meaning operator-disabled.
        State,
        Text,
    }

    /// One recognized line of a protocol detail block.
    #[derive(Debug)]
    pub struct FieldGrammar {
        /// Name used in diagnostics.
        pub name: &'static str,
        pub target: FieldTarget,
        pub conversion: Conversion,
        /// Captures the value text in group 1.
        pub pattern: Regex,
    }

    const ADDR: &str = r"(\[?[0-9A-Fa-f:.]+(?:%[^\s\]]+)?\]?)";
    const TIMER: &str = r"([0-9]+(?:\.[0-9]+)?)";
    const STATS: &str = r"\s+[0-9-]+\s+[0-9-]+\s+[0-9-]+\s+[0-9-]+\s*$";

    fn field(
        name: &'static str,
        target: FieldTarget,
        conversion: Conversion,
        pattern: &str,
    ) -> FieldGrammar {
        FieldGrammar {
            name,
            target,
            conversion,
            pattern: compile(pattern),
        }
    }

    /// Detail-block fields in matching order.
    pub static FIELDS: Lazy<Vec<FieldGrammar>> = Lazy::new(|| {
        use Conversion as C;
        use FieldTarget as T;
        vec![
            field(
                "bgpPeerIdentifier",
                T::Attribute(AttributeKey::PeerIdentifier),
                C::Address,
                r"^\s+Neighbor ID:\s+([0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)\s*$",
            ),
            field(
                "bgpPeerState",
                T::Attribute(AttributeKey::PeerState),
                C::State,
                r"^\s+BGP state:\s+([a-zA-Z]+)\s*$",
            ),
            field(
                "bgpPeerLocalAddr",
                T::Attribute(AttributeKey::PeerLocalAddr),
                C::Address,
                &format!(r"^\s+Source address:\s+{}\s*$", ADDR),
            ),
            field(
                "bgpPeerLocalAs",
                T::LocalAs,
                C::Integer,
                r"^\s+Local AS:\s+([0-9]+)\s*$",
            ),
            field(
                "bgpPeerRemoteAddr",
                T::RemoteAddr,
                C::Address,
                &format!(r"^\s+Neighbor address:\s+{}\s*$", ADDR),
            ),
            field(
                "bgpPeerRemoteAs",
                T::Attribute(AttributeKey::PeerRemoteAs),
                C::Integer,
                r"^\s+Neighbor AS:\s+([0-9]+)\s*$",
            ),
            field(
                "bgpPeerInUpdates",
                T::Attribute(AttributeKey::PeerInUpdates),
                C::Counter,
                &format!(r"^\s+Import updates:\s+([0-9]+){}", STATS),
            ),
            field(
                "bgpPeerOutUpdates",
                T::Attribute(AttributeKey::PeerOutUpdates),
                C::Counter,
                &format!(r"^\s+Export updates:\s+([0-9]+){}", STATS),
            ),
            field(
                "bgpPeerHoldTime",
                T::Attribute(AttributeKey::PeerHoldTime),
                C::Timer,
                &format!(r"^\s+Hold timer:\s+{}/[0-9]+\s*$", TIMER),
            ),
            field(
                "bgpPeerHoldTimeConfigured",
                T::Attribute(AttributeKey::PeerHoldTimeConfigured),
                C::Integer,
                &format!(r"^\s+Hold timer:\s+{}/([0-9]+)\s*$", r"[0-9]+(?:\.[0-9]+)?"),
            ),
            field(
                "bgpPeerKeepAlive",
                T::Attribute(AttributeKey::PeerKeepAlive),
                C::Timer,
                &format!(r"^\s+Keepalive timer:\s+{}/[0-9]+\s*$", TIMER),
            ),
            field(
                "bgpPeerKeepAliveConfigured",
                T::Attribute(AttributeKey::PeerKeepAliveConfigured),
                C::Integer,
                &format!(r"^\s+Keepalive timer:\s+{}/([0-9]+)\s*$", r"[0-9]+(?:\.[0-9]+)?"),
            ),
            field(
                "bgpPeerLastError",
                T::Attribute(AttributeKey::PeerLastError),
                C::Text,
                r"^\s+Last error:\s+([a-zA-Z0-9_ -]+?)\s*$",
            ),
        ]
    });
}

/// Socket table grammar.
pub mod sockets {
    use super::*;

    /// `[State] Recv-Q Send-Q Local:Port Peer:Port ...`
    pub static CONNECTION: Lazy<Regex> = Lazy::new(|| {
        compile(r"^\s*(?:[A-Za-z][A-Za-z0-9-]*\s+)?[0-9]+\s+[0-9]+\s+(\S+):([0-9]+)\s+(\S+):([0-9]+)")
    });
}
