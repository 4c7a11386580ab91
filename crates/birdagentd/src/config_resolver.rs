//! Flattening and interpretation of the bird configuration.
//!
//! [`resolve_includes`] turns a configuration file and everything it
//! includes into one lazy, depth-first line stream. [`extract_static_config`]
//! then pulls the per-protocol BGP settings and the global timeformat flag
//! out of that stream.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use birdagent_common::{AgentError, AgentResult};
use tracing::{debug, warn};

use crate::tables::config;
use crate::types::{parse_ip, ProtocolName, StaticConfig, StaticPeerConfig};

/// Default limit for nested include directives.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// Marker emitted before the lines of each included file.
pub fn include_marker(included: &Path, directive: &str) -> String {
    format!("# subconf: {} (from {})", included.display(), directive)
}

/// One open file in the include chain.
struct Frame {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    /// Matches of the include directive currently being expanded.
    pending: Option<(std::vec::IntoIter<PathBuf>, String)>,
}

impl Frame {
    fn open(path: PathBuf) -> AgentResult<Self> {
        let file = File::open(&path).map_err(|e| AgentError::config_unreadable(&path, e))?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            pending: None,
        })
    }
}

/// Lazy depth-first line stream over a configuration and its includes.
///
/// Lines are yielded whitespace-stripped. After the first error the
/// stream ends.
pub struct ConfigLines {
    stack: Vec<Frame>,
    max_depth: usize,
}

/// Opens `root` and returns the flattened line stream.
///
/// Include patterns are expanded against the filesystem each time they are
/// reached; relative patterns are taken relative to the including file's
/// directory. An include chain deeper than `max_depth` files yields
/// [`AgentError::IncludeDepthExceeded`].
pub fn resolve_includes(root: impl AsRef<Path>, max_depth: usize) -> AgentResult<ConfigLines> {
    let root = Frame::open(root.as_ref().to_path_buf())?;
    Ok(ConfigLines {
        stack: vec![root],
        max_depth,
    })
}

impl ConfigLines {
    /// Expands an include pattern into the files it currently matches.
    ///
    /// A pattern the glob syntax rejects matches nothing.
    fn expand(including: &Path, pattern: &str) -> Vec<PathBuf> {
        let resolved = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            including
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(pattern)
        };
        let resolved = resolved.to_string_lossy().into_owned();

        let paths = match glob::glob(&resolved) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern = %resolved, error = %e, "Invalid include pattern, nothing included");
                return Vec::new();
            }
        };

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => matches.push(path),
                Err(e) => debug!(pattern = %resolved, error = %e, "Skipping unreadable include match"),
            }
        }
        debug!(pattern = %resolved, count = matches.len(), "Resolved include");
        matches
    }

    fn fail(&mut self, err: AgentError) -> Option<AgentResult<String>> {
        self.stack.clear();
        Some(Err(err))
    }
}

impl Iterator for ConfigLines {
    type Item = AgentResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.stack.len();
            let frame = self.stack.last_mut()?;

            if let Some((matches, directive)) = frame.pending.as_mut() {
                match matches.next() {
                    Some(included) => {
                        if depth >= self.max_depth {
                            let err = AgentError::IncludeDepthExceeded {
                                path: frame.path.clone(),
                                depth: self.max_depth,
                            };
                            return self.fail(err);
                        }
                        let marker = include_marker(&included, directive);
                        match Frame::open(included) {
                            Ok(child) => self.stack.push(child),
                            Err(e) => return self.fail(e),
                        }
                        return Some(Ok(marker));
                    }
                    None => {
                        frame.pending = None;
                        continue;
                    }
                }
            }

            let raw = match frame.lines.next() {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    let err = AgentError::config_unreadable(&frame.path, e);
                    return self.fail(err);
                }
                None => {
                    self.stack.pop();
                    continue;
                }
            };

            let line = raw.trim();
            let Some(caps) = config::INCLUDE.captures(line) else {
                return Some(Ok(line.to_string()));
            };

            let matches = Self::expand(&frame.path, &caps[1]);
            frame.pending = Some((matches.into_iter(), line.to_string()));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Protocol,
    Template,
}

/// Extracts static BGP configuration from a flattened line stream.
///
/// Fails with [`AgentError::TimeformatMissing`] if
/// `timeformat protocol iso long;` appears nowhere in the stream; `root`
/// only names the configuration in that error.
pub fn extract_static_config<I>(lines: I, root: &Path) -> AgentResult<StaticConfig>
where
    I: IntoIterator<Item = AgentResult<String>>,
{
    let mut timeformat_enabled = false;
    let mut protocols: BTreeMap<ProtocolName, StaticPeerConfig> = BTreeMap::new();
    let mut templates: BTreeMap<String, StaticPeerConfig> = BTreeMap::new();
    let mut current: Option<(BlockKind, String)> = None;

    for line in lines {
        let line = line?;

        if config::TIMEFORMAT.is_match(&line) {
            timeformat_enabled = true;
        }

        if let Some(caps) = config::PROTOCOL_BEGIN.captures(&line) {
            let entry = StaticPeerConfig {
                template: caps.get(2).map(|m| m.as_str().to_string()),
                ..Default::default()
            };
            protocols.insert(caps[1].to_string(), entry);
            current = Some((BlockKind::Protocol, caps[1].to_string()));
        } else if let Some(caps) = config::TEMPLATE_BEGIN.captures(&line) {
            let entry = StaticPeerConfig {
                template: caps.get(2).map(|m| m.as_str().to_string()),
                ..Default::default()
            };
            templates.insert(caps[1].to_string(), entry);
            current = Some((BlockKind::Template, caps[1].to_string()));
        }

        if let Some((kind, name)) = &current {
            let block = match kind {
                BlockKind::Protocol => protocols.get_mut(name),
                BlockKind::Template => templates.get_mut(name),
            };
            if let Some(block) = block {
                apply_directives(block, name, &line);
            }
        }

        if config::BLOCK_END.is_match(&line) {
            current = None;
        }
    }

    if !timeformat_enabled {
        return Err(AgentError::TimeformatMissing {
            path: root.to_path_buf(),
        });
    }

    for (name, peer) in protocols.iter_mut() {
        apply_templates(name, peer, &templates);
    }

    debug!(
        protocols = protocols.len(),
        templates = templates.len(),
        "Extracted static BGP configuration"
    );

    Ok(StaticConfig {
        timeformat_enabled,
        peers: protocols,
    })
}

fn apply_directives(block: &mut StaticPeerConfig, name: &str, line: &str) {
    if let Some(caps) = config::HOLD_TIME.captures(line) {
        match caps[1].parse() {
            Ok(v) => block.hold_time = Some(v),
            Err(e) => warn!(protocol = %name, value = &caps[1], error = %e, "Ignoring hold time"),
        }
    }
    if let Some(caps) = config::KEEPALIVE_TIME.captures(line) {
        match caps[1].parse() {
            Ok(v) => block.keepalive_time = Some(v),
            Err(e) => {
                warn!(protocol = %name, value = &caps[1], error = %e, "Ignoring keepalive time")
            }
        }
    }
    if let Some(caps) = config::NEIGHBOR.captures(line) {
        match parse_ip(&caps[1]) {
            Ok(addr) => block.remote_addr = Some(addr),
            Err(e) => {
                warn!(protocol = %name, value = &caps[1], error = %e, "Ignoring neighbor address")
            }
        }
        if let Some(asn) = caps.get(2) {
            match asn.as_str().parse() {
                Ok(asn) => block.remote_as = Some(asn),
                Err(e) => {
                    warn!(protocol = %name, value = asn.as_str(), error = %e, "Ignoring neighbor AS")
                }
            }
        }
    }
}

/// Fills unset values of `peer` from its template chain.
fn apply_templates(
    name: &str,
    peer: &mut StaticPeerConfig,
    templates: &BTreeMap<String, StaticPeerConfig>,
) {
    let mut visited = HashSet::new();
    let mut next = peer.template.clone();
    while let Some(template) = next {
        if !visited.insert(template.clone()) {
            warn!(protocol = %name, template = %template, "Template chain loops, stopping");
            break;
        }
        match templates.get(&template) {
            Some(base) => {
                peer.inherit(base);
                next = base.template.clone();
            }
            None => {
                warn!(protocol = %name, template = %template, "Unknown template");
                break;
            }
        }
    }
}
