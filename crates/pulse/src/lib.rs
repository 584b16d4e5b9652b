//! Pulse - health checks over a consensus/execution client matrix
//!
//! This library runs metric checks against every client pair of a network,
//! correlates the failures to find root-cause clients, and narrows the
//! results down to the one client a caller is watching.

pub mod analyzer;
pub mod checks;
pub mod clients;
pub mod error;
pub mod notify;
pub mod pair;

// Re-export main types
pub use analyzer::{AnalysisResult, Analyzer};
pub use checks::{
    Category, Check, CheckConfig, CheckResult, CheckRunner, RunContext, RunOutcome, Selector,
    Status,
};
pub use clients::Dimension;
pub use error::{Error, Result};
pub use pair::RolePair;

/// Minimum number of distinct failing peers before a client counts as a root cause
pub const MIN_FAILURES_FOR_ROOT_CAUSE: usize = 2;

/// A root cause failing with more peers than this is never demoted
pub const MAJOR_ROOT_CAUSE_PEERS: usize = 4;
