use chrono::{DateTime, Utc};
use pulse::RunOutcome;
use pulse::notify::Decision;
use serde::{Deserialize, Serialize};

use crate::config::Target;

/// Result of one scheduled run for a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    /// Target that was checked
    pub target: Target,

    /// Run id shared with the run log
    pub run_id: String,

    /// When the run finished
    pub finished_at: DateTime<Utc>,

    /// Filtered results and analysis, if the run completed
    pub outcome: Option<RunOutcome>,

    /// Whether the outcome warrants an alert
    pub decision: Decision,

    /// Why the run did not complete
    pub error_message: Option<String>,

    /// Audit trail of the run
    pub log: Vec<String>,
}

impl TargetReport {
    pub fn new(target: Target, run_id: impl Into<String>) -> Self {
        Self {
            target,
            run_id: run_id.into(),
            finished_at: Utc::now(),
            outcome: None,
            decision: Decision::Skip,
            error_message: None,
            log: Vec::new(),
        }
    }

    /// Record a completed run and decide on it
    pub fn completed(mut self, outcome: RunOutcome) -> Self {
        self.decision = outcome.decision(self.target.alert_unexplained);
        self.outcome = Some(outcome);
        self
    }

    /// Record a run that could not complete
    pub fn failed(mut self, error: impl std::fmt::Display) -> Self {
        self.error_message = Some(error.to_string());
        self
    }

    pub fn with_log(mut self, log: Vec<String>) -> Self {
        self.log = log;
        self
    }

    pub fn should_notify(&self) -> bool {
        self.decision.should_notify()
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }
}
