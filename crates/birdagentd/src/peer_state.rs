//! Parsing of `birdc show protocols all` output.
//!
//! The output is a sequence of protocol blocks. Each starts with a summary
//! line carrying the protocol name and the time of its last state change,
//! continues with indented `Key: value` detail lines and ends at a blank
//! line. Only BGP protocols that the static configuration knows are kept.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::report::{Warning, Warnings};
use crate::tables::status::{self, Conversion, FieldGrammar, FieldTarget};
use crate::types::{
    parse_ip, AdminStatus, AttributeKey, AttributeValue, BgpState, PeerRecord, ProtocolName,
    StaticConfig,
};

/// Dynamic per-peer records keyed by protocol name.
pub type DynamicPeers = BTreeMap<ProtocolName, PeerRecord>;

/// Literal state bird prints for an operator-disabled protocol.
const DISABLED_STATE: &str = "down";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parses a status timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` with an optional fractional part, a `T`
/// separator and an optional `Z` or numeric UTC offset. Timestamps without
/// a zone are interpreted in `tz`; for an ambiguous local time the earlier
/// instant is used.
pub fn parse_timestamp<Tz: TimeZone>(text: &str, tz: &Tz) -> Result<DateTime<Utc>, String> {
    let mut normalized = text.trim().replacen('T', " ", 1);
    if let Some(stripped) = normalized.strip_suffix('Z') {
        normalized = format!("{}+00:00", stripped.trim_end());
    }
    // "12:00:00 +0100" -> "12:00:00+0100"
    if let Some(pos) = normalized.rfind(' ') {
        if pos > 10 && normalized[pos + 1..].starts_with(|c: char| c == '+' || c == '-') {
            normalized.remove(pos);
        }
    }

    for format in ZONED_FORMATS {
        if let Ok(ts) = DateTime::<FixedOffset>::parse_from_str(&normalized, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|ts| ts.with_timezone(&Utc))
                .ok_or_else(|| format!("local time {} does not exist", naive));
        }
    }
    Err("unrecognized timestamp format".to_string())
}

fn convert_number<T: std::str::FromStr>(text: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    text.trim().parse::<T>().map_err(|e| e.to_string())
}

/// Whole seconds of a `seconds[.fraction]` timer value.
fn convert_timer(text: &str) -> Result<i64, String> {
    let whole = text.split('.').next().unwrap_or_default();
    convert_number::<i64>(whole)
}

/// Applies one matched field to a record.
fn apply_field(
    record: &mut PeerRecord,
    grammar: &FieldGrammar,
    text: &str,
) -> Result<(), String> {
    match (grammar.target, grammar.conversion) {
        (FieldTarget::RemoteAddr, _) => {
            record.remote_addr = Some(parse_ip(text).map_err(|e| e.to_string())?);
        }
        (FieldTarget::LocalAs, _) => {
            record.local_as = Some(convert_number::<u32>(text)?);
        }
        (FieldTarget::Attribute(key), conversion) => {
            if conversion == Conversion::State && text.eq_ignore_ascii_case(DISABLED_STATE) {
                record.set(key, AttributeValue::Integer(BgpState::Idle.code()));
                record.set(
                    AttributeKey::PeerAdminStatus,
                    AttributeValue::Integer(AdminStatus::Stop.code()),
                );
                record.set(
                    AttributeKey::PeerFsmEstablishedTime,
                    AttributeValue::Gauge32(0),
                );
                return Ok(());
            }
            let value = match conversion {
                Conversion::Address => {
                    AttributeValue::IpAddress(parse_ip(text).map_err(|e| e.to_string())?)
                }
                Conversion::Counter => AttributeValue::counter(convert_number::<u64>(text)?),
                Conversion::Timer => AttributeValue::Integer(convert_timer(text)?),
                Conversion::Integer => AttributeValue::Integer(convert_number::<i64>(text)?),
                Conversion::State => {
                    let state = BgpState::from_name(text)
                        .ok_or_else(|| format!("unknown BGP state {:?}", text))?;
                    AttributeValue::Integer(state.code())
                }
                Conversion::Text => AttributeValue::OctetString(text.trim().to_string()),
            };
            if value.kind() != key.kind() {
                return Err(format!("{:?} value does not fit {}", value.kind(), key));
            }
            record.set(key, value);
        }
    }
    Ok(())
}

/// Parses daemon status output into per-peer records.
///
/// Every kept record is seeded from the protocol's static configuration.
/// `now` and `tz` anchor the established-time computation. Protocols not in
/// `static_cfg` and fields whose text does not convert are recorded in
/// `warnings` and skipped.
pub fn parse<Tz: TimeZone>(
    output: &str,
    static_cfg: &StaticConfig,
    now: DateTime<Utc>,
    tz: &Tz,
    warnings: &mut Warnings,
) -> DynamicPeers {
    let mut peers = DynamicPeers::new();
    let mut current: Option<ProtocolName> = None;

    for line in output.lines() {
        if let Some(caps) = status::PROTOCOL_BEGIN.captures(line) {
            let name = caps[1].to_string();
            let Some(config) = static_cfg.peers.get(&name) else {
                warnings.push(Warning::UnknownProtocol { protocol: name });
                current = None;
                continue;
            };

            let mut record = PeerRecord::seeded(config);
            match parse_timestamp(&caps[2], tz) {
                Ok(since) => {
                    let secs = (now - since).num_seconds().unsigned_abs();
                    record.set(
                        AttributeKey::PeerFsmEstablishedTime,
                        AttributeValue::gauge(secs),
                    );
                }
                Err(reason) => warnings.push(Warning::FieldConversion {
                    protocol: name.clone(),
                    field: AttributeKey::PeerFsmEstablishedTime.name(),
                    text: caps[2].to_string(),
                    reason,
                }),
            }
            debug!(protocol = %name, "Parsing protocol block");
            peers.insert(name.clone(), record);
            current = Some(name);
        }

        if let Some(name) = &current {
            if let Some(record) = peers.get_mut(name) {
                for grammar in status::FIELDS.iter() {
                    let Some(caps) = grammar.pattern.captures(line) else {
                        continue;
                    };
                    if let Err(reason) = apply_field(record, grammar, &caps[1]) {
                        warnings.push(Warning::FieldConversion {
                            protocol: name.clone(),
                            field: grammar.name,
                            text: caps[1].to_string(),
                            reason,
                        });
                    }
                }
            }
        }

        if status::PROTOCOL_END.is_match(line) {
            current = None;
        }
    }

    for name in static_cfg.peers.keys().filter(|n| !peers.contains_key(*n)) {
        info!(protocol = %name, "Configured protocol not reported by the daemon");
    }

    peers
}
