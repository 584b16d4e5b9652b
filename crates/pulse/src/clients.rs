//! Known clients and the two dimensions of the client matrix.

use serde::{Deserialize, Serialize};

/// Side of the client matrix a client belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Consensus,
    Execution,
}

impl Dimension {
    /// The other side of the matrix
    pub fn peer(self) -> Self {
        match self {
            Dimension::Consensus => Dimension::Execution,
            Dimension::Execution => Dimension::Consensus,
        }
    }

    /// Short label used in evidence and log lines
    pub fn short(self) -> &'static str {
        match self {
            Dimension::Consensus => "CL",
            Dimension::Execution => "EL",
        }
    }

    /// Classify a known client name
    pub fn of_client(client: &str) -> Option<Self> {
        if is_consensus_client(client) {
            Some(Dimension::Consensus)
        } else if is_execution_client(client) {
            Some(Dimension::Execution)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Consensus => write!(f, "consensus"),
            Dimension::Execution => write!(f, "execution"),
        }
    }
}

pub const CL_LIGHTHOUSE: &str = "lighthouse";
pub const CL_PRYSM: &str = "prysm";
pub const CL_LODESTAR: &str = "lodestar";
pub const CL_NIMBUS: &str = "nimbus";
pub const CL_TEKU: &str = "teku";
pub const CL_GRANDINE: &str = "grandine";
pub const EL_NETHERMIND: &str = "nethermind";
pub const EL_BESU: &str = "besu";
pub const EL_GETH: &str = "geth";
pub const EL_RETH: &str = "reth";
pub const EL_ERIGON: &str = "erigon";
pub const EL_ETHEREUMJS: &str = "ethereumjs";
pub const EL_NIMBUSEL: &str = "nimbusel";

pub const CONSENSUS_CLIENTS: &[&str] = &[
    CL_LIGHTHOUSE,
    CL_PRYSM,
    CL_LODESTAR,
    CL_NIMBUS,
    CL_TEKU,
    CL_GRANDINE,
];

pub const EXECUTION_CLIENTS: &[&str] = &[
    EL_NETHERMIND,
    EL_BESU,
    EL_GETH,
    EL_RETH,
    EL_ERIGON,
    EL_ETHEREUMJS,
    EL_NIMBUSEL,
];

/// Clients still maturing; their failures are tolerated by the analyzer when enabled
pub const PRE_PRODUCTION_CLIENTS: &[&str] = &[EL_ETHEREUMJS, EL_NIMBUSEL];

pub fn is_consensus_client(client: &str) -> bool {
    CONSENSUS_CLIENTS.contains(&client)
}

pub fn is_execution_client(client: &str) -> bool {
    EXECUTION_CLIENTS.contains(&client)
}
