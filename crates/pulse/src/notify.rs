//! Whether an analysis warrants alerting on its target client.

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisResult;
use crate::checks::filter::TargetMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// The target itself was identified as a root cause
    RootCause,
    /// The target has failing nodes no root cause explains
    Unexplained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Notify(Reason),
    Skip,
}

impl Decision {
    pub fn should_notify(&self) -> bool {
        matches!(self, Decision::Notify(_))
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Notify(Reason::RootCause) => {
                write!(f, "NOTIFY: Client identified as root cause")
            }
            Decision::Notify(Reason::Unexplained) => {
                write!(f, "NOTIFY: Client has unexplained issues")
            }
            Decision::Skip => write!(f, "NO NOTIFICATION: No root cause or unexplained issues"),
        }
    }
}

/// Decide whether the matcher's target should be alerted on. Unexplained
/// issues only count when `alert_unexplained` is set.
pub fn decide(
    matcher: &TargetMatcher<'_>,
    analysis: &AnalysisResult,
    alert_unexplained: bool,
) -> Decision {
    if analysis.is_root_cause(matcher.target) {
        return Decision::Notify(Reason::RootCause);
    }

    let has_unexplained = analysis
        .unexplained_issues
        .iter()
        .any(|node| matcher.matches(node));

    if alert_unexplained && has_unexplained {
        Decision::Notify(Reason::Unexplained)
    } else {
        Decision::Skip
    }
}
