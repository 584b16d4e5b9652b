//! Narrowing full-matrix results down to a single client.
//!
//! Node names are matched by parsing them into a [`RolePair`] and comparing
//! the role on the target's dimension, so `nimbus` never matches a
//! `nimbusel` node.

use std::collections::BTreeMap;

use super::{CheckResult, detail_keys};
use crate::clients::Dimension;
use crate::pair::RolePair;

/// Decides whether a node name belongs to the target client
#[derive(Debug, Clone, Copy)]
pub struct TargetMatcher<'a> {
    pub network: &'a str,
    pub dimension: Dimension,
    pub target: &'a str,
}

impl<'a> TargetMatcher<'a> {
    pub fn new(network: &'a str, dimension: Dimension, target: &'a str) -> Self {
        Self { network, dimension, target }
    }

    pub fn matches(&self, node: &str) -> bool {
        RolePair::parse_in_network(node.trim(), self.network).matches(self.dimension, self.target)
    }

    /// Keep only the matching lines of a newline separated list
    pub fn filter_lines(&self, text: &str) -> Option<String> {
        let kept: Vec<&str> = text.lines().filter(|line| self.matches(line)).collect();
        (!kept.is_empty()).then(|| kept.join("\n"))
    }
}

/// Copy of a failed result restricted to the target's nodes, or `None` when
/// the result is not failing or none of its nodes belong to the target.
///
/// Node list details are narrowed line by line; every other detail is
/// copied unchanged.
pub fn filter_result(result: &CheckResult, matcher: &TargetMatcher<'_>) -> Option<CheckResult> {
    if !result.is_fail() {
        return None;
    }

    let affected_nodes: Vec<String> = result
        .affected_nodes
        .iter()
        .filter(|node| matcher.matches(node))
        .cloned()
        .collect();

    if affected_nodes.is_empty() {
        return None;
    }

    let mut details = BTreeMap::new();
    for (key, value) in &result.details {
        if !detail_keys::NODE_LISTS.contains(&key.as_str()) {
            details.insert(key.clone(), value.clone());
            continue;
        }

        if let Some(filtered) = matcher.filter_lines(value) {
            details.insert(key.clone(), filtered);
        }
    }

    Some(CheckResult {
        affected_nodes,
        details,
        ..result.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Category;

    fn peer_result(nodes: &[&str]) -> CheckResult {
        CheckResult::fail(
            "Low peer count",
            Category::General,
            "The following EL nodes have low peer count",
            nodes.iter().map(|node| node.to_string()).collect(),
        )
        .with_node_list(detail_keys::LOW_PEER_NODES)
        .with_detail(detail_keys::QUERY, "eth_exe_net_peer_count < 5")
    }

    #[test]
    fn test_filter_keeps_only_target_nodes() {
        let result = peer_result(&["lighthouse-geth-1", "prysm-geth-2", "teku-besu-1"]);
        let matcher = TargetMatcher::new("devnet-1", Dimension::Execution, "geth");

        let filtered = filter_result(&result, &matcher).unwrap();
        assert_eq!(
            filtered.affected_nodes,
            vec!["lighthouse-geth-1", "prysm-geth-2"]
        );
        assert_eq!(
            filtered.details[detail_keys::LOW_PEER_NODES],
            "lighthouse-geth-1\nprysm-geth-2"
        );
        assert_eq!(
            filtered.details[detail_keys::QUERY],
            "eth_exe_net_peer_count < 5"
        );
    }

    #[test]
    fn test_filter_copies_other_details() {
        let result = peer_result(&["lighthouse-geth-1", "teku-besu-1"])
            .with_detail("threshold", "teku-besu-1 below 5")
            .with_detail(detail_keys::STUCK_NODES, "teku-besu-1");
        let matcher = TargetMatcher::new("devnet-1", Dimension::Execution, "geth");

        let filtered = filter_result(&result, &matcher).unwrap();
        assert_eq!(filtered.details["threshold"], "teku-besu-1 below 5");
        assert!(!filtered.details.contains_key(detail_keys::STUCK_NODES));
        assert_eq!(
            filtered.details[detail_keys::LOW_PEER_NODES],
            "lighthouse-geth-1"
        );
    }

    #[test]
    fn test_filter_is_not_substring_match() {
        let result = peer_result(&["lighthouse-nimbusel-1", "nimbus-geth-1"]);
        let matcher = TargetMatcher::new("devnet-1", Dimension::Consensus, "nimbus");

        let filtered = filter_result(&result, &matcher).unwrap();
        assert_eq!(filtered.affected_nodes, vec!["nimbus-geth-1"]);
    }

    #[test]
    fn test_filter_drops_unrelated_results() {
        let result = peer_result(&["teku-besu-1"]);
        let matcher = TargetMatcher::new("devnet-1", Dimension::Execution, "geth");
        assert!(filter_result(&result, &matcher).is_none());

        let ok = CheckResult::ok("Low peer count", Category::General, "All good");
        assert!(filter_result(&ok, &matcher).is_none());
    }
}
