use std::collections::{BTreeMap, BTreeSet};

use super::types::ObservationIndex;
use crate::MAJOR_ROOT_CAUSE_PEERS;
use crate::clients::Dimension;

/// Distinct peers each client has failed with, per dimension.
///
/// Symmetric by construction: `geth` failing with `teku` implies `teku`
/// failing with `geth`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureGraph {
    consensus: BTreeMap<String, BTreeSet<String>>,
    execution: BTreeMap<String, BTreeSet<String>>,
}

impl FailureGraph {
    /// Build from every complete pair with at least one unhealthy node
    pub fn from_index(index: &ObservationIndex) -> Self {
        let mut graph = Self::default();

        for (pair, observations) in index {
            if !pair.is_complete() || observations.iter().all(|obs| obs.healthy) {
                continue;
            }

            graph
                .consensus
                .entry(pair.consensus.clone())
                .or_default()
                .insert(pair.execution.clone());
            graph
                .execution
                .entry(pair.execution.clone())
                .or_default()
                .insert(pair.consensus.clone());
        }

        graph
    }

    pub fn records(&self, dimension: Dimension) -> &BTreeMap<String, BTreeSet<String>> {
        match dimension {
            Dimension::Consensus => &self.consensus,
            Dimension::Execution => &self.execution,
        }
    }

    /// Peers `role` has failed with
    pub fn peers(&self, dimension: Dimension, role: &str) -> Option<&BTreeSet<String>> {
        self.records(dimension).get(role)
    }

    pub fn failure_count(&self, dimension: Dimension, role: &str) -> usize {
        self.peers(dimension, role).map_or(0, BTreeSet::len)
    }

    /// Every failing role on both dimensions, consensus first
    pub fn roles(&self) -> impl Iterator<Item = (Dimension, &str, &BTreeSet<String>)> {
        let consensus = self
            .consensus
            .iter()
            .map(|(role, peers)| (Dimension::Consensus, role.as_str(), peers));
        let execution = self
            .execution
            .iter()
            .map(|(role, peers)| (Dimension::Execution, role.as_str(), peers));
        consensus.chain(execution)
    }

    /// Roles failing with more than [`MAJOR_ROOT_CAUSE_PEERS`] peers
    pub fn is_major(&self, dimension: Dimension, role: &str) -> bool {
        self.failure_count(dimension, role) > MAJOR_ROOT_CAUSE_PEERS
    }

    pub fn is_empty(&self) -> bool {
        self.consensus.is_empty() && self.execution.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::types::NodeObservation;
    use crate::pair::RolePair;

    fn index(nodes: &[(&str, bool)]) -> ObservationIndex {
        let mut index = ObservationIndex::new();
        for (name, healthy) in nodes {
            index
                .entry(RolePair::parse(name))
                .or_default()
                .push(NodeObservation {
                    name: name.to_string(),
                    healthy: *healthy,
                });
        }
        index
    }

    #[test]
    fn test_graph_is_symmetric() {
        let graph = FailureGraph::from_index(&index(&[
            ("lighthouse-geth-1", false),
            ("teku-geth-1", false),
            ("teku-besu-1", true),
        ]));

        assert_eq!(graph.failure_count(Dimension::Execution, "geth"), 2);
        assert_eq!(graph.failure_count(Dimension::Consensus, "teku"), 1);
        assert_eq!(graph.failure_count(Dimension::Execution, "besu"), 0);
        assert!(
            graph
                .peers(Dimension::Consensus, "lighthouse")
                .unwrap()
                .contains("geth")
        );
    }

    #[test]
    fn test_graph_deduplicates_instances() {
        let graph = FailureGraph::from_index(&index(&[
            ("prysm-geth-1", false),
            ("prysm-geth-2", false),
            ("prysm-geth-3", true),
        ]));

        assert_eq!(graph.failure_count(Dimension::Consensus, "prysm"), 1);
    }

    #[test]
    fn test_graph_skips_incomplete_pairs() {
        let graph = FailureGraph::from_index(&index(&[("geth", false), ("-geth-1", false)]));
        assert!(graph.is_empty());
    }
}
