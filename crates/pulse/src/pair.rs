//! Node name parsing.
//!
//! Nodes are named `[network-]<consensus>-<execution>[-<ordinal>]`, e.g.
//! `lighthouse-geth-1` or `pectra-devnet-6-teku-besu-2`. The convention is a
//! heuristic, not a schema: anything that does not fit produces an incomplete
//! pair which callers must leave out of any aggregation.

use serde::{Deserialize, Serialize};

use crate::clients::Dimension;

/// Network prefixes recognised without being told the network
const KNOWN_NETWORK_PREFIXES: &[&str] = &["pectra-devnet-6-"];

/// Minimum segment count before a network prefix is stripped
const MIN_PREFIXED_SEGMENTS: usize = 4;

/// A consensus/execution client combination
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RolePair {
    pub consensus: String,
    pub execution: String,
}

impl RolePair {
    pub fn new(consensus: impl Into<String>, execution: impl Into<String>) -> Self {
        Self {
            consensus: consensus.into(),
            execution: execution.into(),
        }
    }

    /// Parse a node name using the built-in network prefixes
    pub fn parse(name: &str) -> Self {
        Self::parse_with(name, None)
    }

    /// Parse a node name, additionally stripping `<network>-` when present
    pub fn parse_in_network(name: &str, network: &str) -> Self {
        Self::parse_with(name, Some(network))
    }

    fn parse_with(name: &str, network: Option<&str>) -> Self {
        let segments = name.split('-').count();
        let remainder = if segments >= MIN_PREFIXED_SEGMENTS {
            strip_network_prefix(name, network).unwrap_or(name)
        } else {
            name
        };

        let mut parts = remainder.split('-');
        match (parts.next(), parts.next()) {
            (Some(consensus), Some(execution)) => Self::new(consensus, execution),
            _ => Self::default(),
        }
    }

    /// Role on the given dimension
    pub fn role(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Consensus => &self.consensus,
            Dimension::Execution => &self.execution,
        }
    }

    /// Both roles are present
    pub fn is_complete(&self) -> bool {
        !self.consensus.is_empty() && !self.execution.is_empty()
    }

    /// Exact role comparison on one dimension. Empty roles never match.
    pub fn matches(&self, dimension: Dimension, role: &str) -> bool {
        !role.is_empty() && self.role(dimension) == role
    }
}

impl std::fmt::Display for RolePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.consensus, self.execution)
    }
}

fn strip_network_prefix<'a>(name: &'a str, network: Option<&str>) -> Option<&'a str> {
    let known = KNOWN_NETWORK_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix));
    if let Some(rest) = known {
        return Some(rest);
    }

    network
        .filter(|network| !network.is_empty())
        .and_then(|network| name.strip_prefix(network))
        .and_then(|rest| rest.strip_prefix('-'))
}
