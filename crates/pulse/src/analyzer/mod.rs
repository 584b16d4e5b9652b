//! Root-cause correlation over client-pair failures.
//!
//! Every node runs one consensus client paired with one execution client.
//! When a client is broken, every pair it takes part in tends to fail, so a
//! client failing alongside several distinct peers is far more likely to be
//! the culprit than any of those peers. The analyzer classifies clients in
//! five steps over the failure graph:
//!
//! 1. collect, per client, the distinct peers it failed with
//! 2. clients failing with at least [`MIN_FAILURES_FOR_ROOT_CAUSE`] peers are root causes
//! 3. remaining clients failing with enough peers that are not root causes are root causes too
//! 4. non-major root causes failing mostly alongside major ones are demoted
//! 5. failing target nodes not covered by a root cause are unexplained
//!
//! ```
//! use pulse::{Analyzer, Dimension};
//!
//! let mut analyzer = Analyzer::new("geth", Dimension::Execution);
//! analyzer.add_node_status("lighthouse-geth-1", false);
//! analyzer.add_node_status("prysm-geth-1", false);
//!
//! let result = analyzer.analyze();
//! assert_eq!(result.root_cause, vec!["geth"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use logger::RunLog;

use crate::clients::Dimension;
use crate::pair::RolePair;
use crate::{MAJOR_ROOT_CAUSE_PEERS, MIN_FAILURES_FOR_ROOT_CAUSE};

pub mod graph;
pub mod types;

pub use graph::FailureGraph;
pub use types::{AnalysisResult, NodeObservation, ObservationIndex};

/// Root causes keyed by dimension and client, with their evidence
type RootCauses = BTreeMap<(Dimension, String), String>;

/// Analyzes the health of one target client against the whole matrix
#[derive(Debug, Clone)]
pub struct Analyzer {
    target: String,
    dimension: Dimension,
    network: Option<String>,
    pre_production: BTreeSet<String>,
    index: ObservationIndex,
    log: RunLog,
}

impl Analyzer {
    pub fn new(target: impl Into<String>, dimension: Dimension) -> Self {
        Self {
            target: target.into(),
            dimension,
            network: None,
            pre_production: BTreeSet::new(),
            index: ObservationIndex::new(),
            log: RunLog::new("analyzer"),
        }
    }

    /// Strip `<network>-` from node names before parsing them
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Clients whose failures are tolerated: never demoted once they are a
    /// root cause, and never reported as the peer of an unexplained issue
    pub fn with_pre_production<I, S>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_production = clients.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    pub fn index(&self) -> &ObservationIndex {
        &self.index
    }

    /// Record a node's health. Names that do not parse into a full client
    /// pair are dropped.
    pub fn add_node_status(&mut self, name: &str, healthy: bool) {
        let pair = self.parse(name);
        if !pair.is_complete() {
            tracing::debug!(node = name, "Discarding node with unrecognised name");
            self.log.record(format!(
                "  - Ignoring {name}: not a <consensus>-<execution> node name"
            ));
            return;
        }

        self.index.entry(pair).or_default().push(NodeObservation {
            name: name.to_string(),
            healthy,
        });
    }

    /// Classify the recorded failures. Does not consume the recorded state,
    /// so repeated calls give the same result.
    pub fn analyze(&self) -> AnalysisResult {
        self.log.record(format!(
            "\n=== Analyzing {} ({})",
            self.target, self.dimension
        ));

        let graph = FailureGraph::from_index(&self.index);
        self.log_relationships(&graph);

        let primary = self.primary_root_causes(&graph);
        let secondary = self.secondary_root_causes(&graph, &primary);

        let mut root_causes = primary;
        root_causes.extend(secondary);
        self.remove_false_positives(&graph, &mut root_causes);

        let unexplained_issues = self.unexplained_issues(&root_causes);

        let mut root_cause: Vec<String> = root_causes
            .keys()
            .map(|(_, client)| client.clone())
            .collect();
        root_cause.sort();
        root_cause.dedup();

        // A name can be a root cause on both dimensions; keep both explanations
        let mut root_cause_evidence: BTreeMap<String, String> = BTreeMap::new();
        for ((_, client), evidence) in root_causes {
            root_cause_evidence
                .entry(client)
                .and_modify(|existing| {
                    existing.push_str("; ");
                    existing.push_str(&evidence);
                })
                .or_insert(evidence);
        }

        let result = AnalysisResult {
            root_cause,
            root_cause_evidence,
            unexplained_issues,
        };
        self.log_results(&result);

        result
    }

    fn parse(&self, name: &str) -> RolePair {
        match &self.network {
            Some(network) => RolePair::parse_in_network(name, network),
            None => RolePair::parse(name),
        }
    }

    fn is_pre_production(&self, client: &str) -> bool {
        self.pre_production.contains(client)
    }

    /// Step 2: clients failing with enough distinct peers
    fn primary_root_causes(&self, graph: &FailureGraph) -> RootCauses {
        graph
            .roles()
            .filter(|(_, _, peers)| peers.len() >= MIN_FAILURES_FOR_ROOT_CAUSE)
            .map(|(dimension, client, peers)| {
                let evidence = format!(
                    "Failing with {} {} clients: {}",
                    peers.len(),
                    dimension.peer().short(),
                    join(peers.iter())
                );
                ((dimension, client.to_string()), evidence)
            })
            .collect()
    }

    /// Step 3: clients failing with enough peers that are not themselves
    /// primary root causes
    fn secondary_root_causes(&self, graph: &FailureGraph, primary: &RootCauses) -> RootCauses {
        let mut secondary = RootCauses::new();

        for (dimension, client, peers) in graph.roles() {
            if primary.contains_key(&(dimension, client.to_string())) {
                continue;
            }

            let independent: Vec<&String> = peers
                .iter()
                .filter(|peer| !primary.contains_key(&(dimension.peer(), peer.to_string())))
                .collect();

            if independent.len() >= MIN_FAILURES_FOR_ROOT_CAUSE {
                let evidence = format!(
                    "Failing with {} non-root-cause {} clients: {}",
                    independent.len(),
                    dimension.peer().short(),
                    join(independent.into_iter())
                );
                secondary.insert((dimension, client.to_string()), evidence);
            }
        }

        secondary
    }

    /// Step 4: drop root causes that only fail alongside major root causes.
    /// Majors are judged on the raw graph, not on the root causes found so far.
    fn remove_false_positives(&self, graph: &FailureGraph, root_causes: &mut RootCauses) {
        root_causes.retain(|(dimension, client), _| {
            if graph.is_major(*dimension, client) {
                return true;
            }

            let Some(peers) = graph.peers(*dimension, client) else {
                return true;
            };

            let non_major = peers
                .iter()
                .filter(|peer| !graph.is_major(dimension.peer(), peer))
                .count();
            if non_major >= MIN_FAILURES_FOR_ROOT_CAUSE {
                return true;
            }

            if self.is_pre_production(client) {
                self.log.record(format!(
                    "  - Keeping {client} as root cause: pre-production client failing with {} peers",
                    peers.len()
                ));
                return true;
            }

            self.log.record(format!(
                "  - Removing {client} as root cause: only {non_major} of its failing peers are not \
                 major root causes (>{MAJOR_ROOT_CAUSE_PEERS} failing peers)"
            ));
            false
        });
    }

    /// Step 5: failing target nodes whose pair involves no root cause
    fn unexplained_issues(&self, root_causes: &RootCauses) -> Vec<String> {
        let is_root_cause = |dimension: Dimension, client: &str| {
            root_causes.contains_key(&(dimension, client.to_string()))
        };

        let mut unexplained = BTreeSet::new();

        for (pair, observations) in &self.index {
            if !pair.matches(self.dimension, &self.target) {
                continue;
            }

            if self.is_pre_production(pair.role(self.dimension.peer())) {
                continue;
            }

            let explained = is_root_cause(Dimension::Consensus, &pair.consensus)
                || is_root_cause(Dimension::Execution, &pair.execution);
            if explained {
                continue;
            }

            unexplained.extend(
                observations
                    .iter()
                    .filter(|obs| !obs.healthy)
                    .map(|obs| obs.name.clone()),
            );
        }

        unexplained.into_iter().collect()
    }

    fn log_relationships(&self, graph: &FailureGraph) {
        for (dimension, client, peers) in graph.roles() {
            self.log.record(format!(
                "  - {client} ({}) is failing with {} clients: {}",
                dimension.short(),
                dimension.peer().short(),
                join(peers.iter())
            ));
        }
    }

    fn log_results(&self, result: &AnalysisResult) {
        if result.is_clear() {
            self.log.record("  - No issues to analyze");
            return;
        }

        for cause in &result.root_cause {
            let evidence = result
                .root_cause_evidence
                .get(cause)
                .map_or("", String::as_str);
            self.log.record(format!("  - Root cause identified: {cause} ({evidence})"));
        }

        for issue in &result.unexplained_issues {
            self.log.record(format!("  - {issue} (unexplained issue)"));
        }
    }
}

fn join<'a>(items: impl Iterator<Item = &'a String>) -> String {
    items.map(String::as_str).collect::<Vec<_>>().join(", ")
}
