use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pair::RolePair;

/// Health verdict of one node for one check run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeObservation {
    pub name: String,
    pub healthy: bool,
}

/// Observations grouped by client pair, in insertion order within a pair
pub type ObservationIndex = BTreeMap<RolePair, Vec<NodeObservation>>;

/// Verdict of one analysis.
///
/// `root_cause` and `unexplained_issues` are sorted and free of duplicates.
/// A node whose failure is explained by a root cause is never listed as
/// unexplained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Clients determined to be the root cause of failures
    pub root_cause: Vec<String>,
    /// Why each root cause was chosen
    pub root_cause_evidence: BTreeMap<String, String>,
    /// Failing target nodes no root cause accounts for
    pub unexplained_issues: Vec<String>,
}

impl AnalysisResult {
    pub fn is_root_cause(&self, client: &str) -> bool {
        self.root_cause.iter().any(|cause| cause == client)
    }

    /// Nothing to report
    pub fn is_clear(&self) -> bool {
        self.root_cause.is_empty() && self.unexplained_issues.is_empty()
    }
}
