use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::filter::{TargetMatcher, filter_result};
use super::{Check, CheckConfig, CheckResult, RunContext};
use crate::analyzer::{AnalysisResult, Analyzer};
use crate::clients::Dimension;
use crate::error::{Error, Result};
use crate::notify::{self, Decision};

/// What a check run found for its target client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Id of the run, shared with its run log
    pub id: String,
    pub network: String,
    pub target: String,
    pub dimension: Dimension,
    /// Failed results restricted to the target's nodes
    pub results: Vec<CheckResult>,
    /// Correlation over the whole network
    pub analysis: AnalysisResult,
}

impl RunOutcome {
    pub fn matcher(&self) -> TargetMatcher<'_> {
        TargetMatcher::new(&self.network, self.dimension, &self.target)
    }

    /// Whether this outcome should be alerted on
    pub fn decision(&self, alert_unexplained: bool) -> Decision {
        notify::decide(&self.matcher(), &self.analysis, alert_unexplained)
    }
}

/// Runs registered checks in two passes.
///
/// The gather pass runs every check against all clients of the network so the
/// analyzer sees the whole failure matrix. The filter pass then keeps only
/// what concerns the configured target client.
#[derive(Clone, Default)]
pub struct CheckRunner {
    checks: Vec<Arc<dyn Check>>,
    pre_production: Vec<String>,
}

impl CheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients the analyzer treats as pre-production
    pub fn with_pre_production<I, S>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_production = clients.into_iter().map(Into::into).collect();
        self
    }

    /// Add a check. Checks run in registration order.
    pub fn register_check(&mut self, check: Arc<dyn Check>) {
        self.checks.push(check);
    }

    /// Run every check for the client targeted by `config`.
    ///
    /// Fails fast: the first check that cannot run aborts the whole run, as
    /// does cancellation or the context deadline. No partial analysis is ever
    /// produced from an incomplete matrix.
    pub async fn run_checks(&self, ctx: &RunContext, config: &CheckConfig) -> Result<RunOutcome> {
        let (dimension, target) = config.target()?;
        let log = ctx.log();

        info!(
            run_id = ctx.id(),
            network = %config.network,
            client = target,
            %dimension,
            "Running checks"
        );
        log.record(format!(
            "=== Running checks:\n  - {target}\n  - {}",
            config.network
        ));

        let mut analyzer = Analyzer::new(target, dimension)
            .with_network(config.network.clone())
            .with_pre_production(self.pre_production.iter().cloned())
            .with_log(log.clone());

        // Every client is queried so root causes on the other dimension show up.
        let gather_config = config.widened();
        let mut raw_results = Vec::with_capacity(self.checks.len());

        for check in &self.checks {
            let result = match ctx.guard(check.run(ctx, &gather_config)).await {
                Ok(Ok(result)) => result,
                Ok(Err(source)) => {
                    warn!(
                        run_id = ctx.id(),
                        check = check.name(),
                        "Check failed to run: {source:#}"
                    );
                    return Err(Error::check(check.name(), source));
                }
                Err(err) => {
                    warn!(
                        run_id = ctx.id(),
                        check = check.name(),
                        "Check run aborted: {err}"
                    );
                    log.record(format!("  - Aborted during {}: {err}", check.name()));
                    return Err(err);
                }
            };

            if result.is_fail() {
                for node in &result.affected_nodes {
                    analyzer.add_node_status(node, false);
                }
            }

            raw_results.push(result);
        }

        let analysis = analyzer.analyze();

        let matcher = TargetMatcher::new(&config.network, dimension, target);
        let results: Vec<CheckResult> = raw_results
            .iter()
            .filter_map(|result| filter_result(result, &matcher))
            .collect();

        log_analysis_summary(ctx, &analysis);
        let decision = notify::decide(&matcher, &analysis, true);
        log.record(format!("\n=== Notification decision\n  - {decision}"));

        info!(
            run_id = ctx.id(),
            client = target,
            failed = results.len(),
            root_causes = analysis.root_cause.len(),
            unexplained = analysis.unexplained_issues.len(),
            "Checks complete"
        );

        Ok(RunOutcome {
            id: ctx.id().to_string(),
            network: config.network.clone(),
            target: target.to_string(),
            dimension,
            results,
            analysis,
        })
    }
}

fn log_analysis_summary(ctx: &RunContext, analysis: &AnalysisResult) {
    let log = ctx.log();
    log.record("\n=== Analysis summary");

    if analysis.is_clear() {
        log.record("  - No issues detected");
        return;
    }

    for cause in &analysis.root_cause {
        log.record(format!("  - {cause} identified as root cause"));
    }

    for issue in &analysis.unexplained_issues {
        log.record(format!("  - {issue} (unexplained issue)"));
    }
}
