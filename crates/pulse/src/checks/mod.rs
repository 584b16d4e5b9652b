//! Health checks and the two-pass runner that executes them.
//!
//! A [`Check`] runs one health query against the client matrix selected by a
//! [`CheckConfig`] and reports the nodes violating its condition. The
//! [`CheckRunner`] runs every registered check against the full matrix,
//! correlates the failures, then narrows the results to the target client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::Dimension;

pub mod context;
pub mod filter;
pub mod runner;

pub use context::RunContext;
pub use runner::{CheckRunner, RunOutcome};

/// Keys of [`CheckResult::details`]
pub mod detail_keys {
    pub const QUERY: &str = "query";
    pub const LOW_PEER_NODES: &str = "lowPeerNodes";
    pub const NOT_SYNCED_NODES: &str = "notSyncedNodes";
    pub const STUCK_NODES: &str = "stuckNodes";
    pub const BEHIND_NODES: &str = "behindNodes";

    /// Keys holding newline separated node names. Only these are narrowed
    /// to the target when results are filtered.
    pub const NODE_LISTS: &[&str] = &[LOW_PEER_NODES, NOT_SYNCED_NODES, STUCK_NODES, BEHIND_NODES];
}

/// Outcome of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Fail,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Fail => write!(f, "FAIL"),
        }
    }
}

/// Kind of problem a check looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    Sync,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::General => write!(f, "General"),
            Category::Sync => write!(f, "Sync"),
        }
    }
}

/// Client selector for one dimension of the matrix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    /// Every client on the dimension
    #[default]
    All,
    /// A single client
    Role(String),
}

impl Selector {
    pub fn role(role: impl Into<String>) -> Self {
        Selector::Role(role.into())
    }

    /// Label matcher value for metric queries
    pub fn pattern(&self) -> &str {
        match self {
            Selector::All => ".*",
            Selector::Role(role) => role,
        }
    }

    pub fn as_role(&self) -> Option<&str> {
        match self {
            Selector::All => None,
            Selector::Role(role) => Some(role),
        }
    }
}

/// What a check run is aimed at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    pub network: String,
    pub consensus: Selector,
    pub execution: Selector,
}

impl CheckConfig {
    pub fn new(network: impl Into<String>, consensus: Selector, execution: Selector) -> Self {
        Self {
            network: network.into(),
            consensus,
            execution,
        }
    }

    /// Config aimed at a single client, placed on the right dimension
    pub fn for_client(network: impl Into<String>, dimension: Dimension, client: &str) -> Self {
        match dimension {
            Dimension::Consensus => Self::new(network, Selector::role(client), Selector::All),
            Dimension::Execution => Self::new(network, Selector::All, Selector::role(client)),
        }
    }

    /// Same network with every client selected
    pub fn widened(&self) -> Self {
        Self::new(self.network.clone(), Selector::All, Selector::All)
    }

    /// The single client this config targets
    pub fn target(&self) -> crate::Result<(Dimension, &str)> {
        match (self.consensus.as_role(), self.execution.as_role()) {
            (Some(consensus), None) => Ok((Dimension::Consensus, consensus)),
            (None, Some(execution)) => Ok((Dimension::Execution, execution)),
            (None, None) => Err(crate::Error::NoTarget),
            (Some(consensus), Some(execution)) => Err(crate::Error::AmbiguousTarget {
                consensus: consensus.to_string(),
                execution: execution.to_string(),
            }),
        }
    }
}

/// Result of a single check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub category: Category,
    pub status: Status,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, String>,
    pub affected_nodes: Vec<String>,
}

impl CheckResult {
    /// A passing result
    pub fn ok(name: impl Into<String>, category: Category, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            status: Status::Ok,
            description: description.into(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
            affected_nodes: Vec::new(),
        }
    }

    /// A failing result listing the affected nodes
    pub fn fail(
        name: impl Into<String>,
        category: Category,
        description: impl Into<String>,
        affected_nodes: Vec<String>,
    ) -> Self {
        Self {
            status: Status::Fail,
            affected_nodes,
            ..Self::ok(name, category, description)
        }
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach the affected nodes as a newline separated detail entry
    pub fn with_node_list(self, key: &str) -> Self {
        let nodes = self.affected_nodes.join("\n");
        self.with_detail(key, nodes)
    }

    pub fn is_fail(&self) -> bool {
        self.status == Status::Fail
    }
}

/// A single health check
#[async_trait]
pub trait Check: Send + Sync {
    /// Human readable name, also used to label errors
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    /// Dimension of the matrix whose clients this check is about
    fn dimension(&self) -> Dimension;

    /// Execute the check. An `Err` means the check itself could not run; an
    /// unhealthy network is reported through [`Status::Fail`].
    async fn run(&self, ctx: &RunContext, config: &CheckConfig) -> anyhow::Result<CheckResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_target_resolution() {
        let config = CheckConfig::for_client("devnet-1", Dimension::Execution, "geth");
        let (dimension, role) = config.target().unwrap();
        assert_eq!(dimension, Dimension::Execution);
        assert_eq!(role, "geth");

        let config = CheckConfig::for_client("devnet-1", Dimension::Consensus, "teku");
        assert_eq!(config.target().unwrap(), (Dimension::Consensus, "teku"));
    }

    #[test]
    fn test_target_requires_exactly_one_role() {
        let none = CheckConfig::new("devnet-1", Selector::All, Selector::All);
        assert!(matches!(none.target(), Err(Error::NoTarget)));

        let both = CheckConfig::new("devnet-1", Selector::role("teku"), Selector::role("geth"));
        assert!(matches!(both.target(), Err(Error::AmbiguousTarget { .. })));
    }

    #[test]
    fn test_widened_keeps_network() {
        let config = CheckConfig::for_client("devnet-1", Dimension::Consensus, "prysm");
        let wide = config.widened();
        assert_eq!(wide.network, "devnet-1");
        assert_eq!(wide.consensus.pattern(), ".*");
        assert_eq!(wide.execution.pattern(), ".*");
        assert_eq!(config.consensus.pattern(), "prysm");
    }

    #[test]
    fn test_fail_result_node_list() {
        let result = CheckResult::fail(
            "Low peer count",
            Category::General,
            "The following nodes have low peer count",
            vec!["teku-geth-1".into(), "teku-besu-1".into()],
        )
        .with_node_list(detail_keys::LOW_PEER_NODES);

        assert!(result.is_fail());
        assert_eq!(
            result.details[detail_keys::LOW_PEER_NODES],
            "teku-geth-1\nteku-besu-1"
        );
    }
}
