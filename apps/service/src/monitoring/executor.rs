use std::sync::Arc;
use std::time::{Duration, Instant};

use pulse::{CheckRunner, RunContext};
use tokio::sync::watch;

use super::types::TargetReport;
use crate::config::Target;
use crate::metrics::Metrics;

/// Runs the registered checks for one target at a time
pub struct MonitoringExecutor {
    runner: Arc<CheckRunner>,
    run_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    metrics: Arc<Metrics>,
}

impl MonitoringExecutor {
    pub fn new(
        runner: Arc<CheckRunner>,
        run_timeout: Duration,
        shutdown: watch::Receiver<bool>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            runner,
            run_timeout,
            shutdown,
            metrics,
        }
    }

    /// Run every check for `target`. Never fails: errors end up in the report.
    pub async fn execute_target(&self, target: &Target) -> TargetReport {
        let started = Instant::now();
        let ctx = RunContext::new()
            .with_timeout(self.run_timeout)
            .with_shutdown(self.shutdown.clone());
        let report = TargetReport::new(target.clone(), ctx.id());

        let config = match target.check_config() {
            Ok(config) => config,
            Err(e) => {
                self.metrics
                    .record_run(target, started.elapsed(), Some("invalid_target"));
                return report.failed(e);
            }
        };

        let report = match self.runner.run_checks(&ctx, &config).await {
            Ok(outcome) => {
                self.metrics.record_run(target, started.elapsed(), None);
                report.completed(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    run_id = ctx.id(),
                    network = %target.network,
                    client = %target.client,
                    "Check run failed: {e}"
                );
                self.metrics
                    .record_run(target, started.elapsed(), Some(e.kind()));
                report.failed(e)
            }
        };

        report.with_log(ctx.log().lines())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse::notify::{Decision, Reason};
    use pulse::{Category, Check, CheckConfig, CheckResult, Dimension};

    struct Failing(&'static [&'static str]);

    #[async_trait]
    impl Check for Failing {
        fn name(&self) -> &str {
            "Node failing to sync"
        }

        fn category(&self) -> Category {
            Category::Sync
        }

        fn dimension(&self) -> Dimension {
            Dimension::Execution
        }

        async fn run(
            &self,
            _ctx: &RunContext,
            _config: &CheckConfig,
        ) -> anyhow::Result<CheckResult> {
            let nodes = self.0.iter().map(|n| n.to_string()).collect();
            Ok(CheckResult::fail(
                self.name(),
                Category::Sync,
                "The following EL nodes are not synced",
                nodes,
            ))
        }
    }

    struct Fixture {
        executor: MonitoringExecutor,
        metrics: Arc<Metrics>,
        shutdown: watch::Sender<bool>,
    }

    fn fixture(nodes: &'static [&'static str]) -> Fixture {
        let mut runner = CheckRunner::new();
        runner.register_check(Arc::new(Failing(nodes)));
        let (shutdown, rx) = watch::channel(false);
        let metrics = Arc::new(Metrics::new().unwrap());
        let executor = MonitoringExecutor::new(
            Arc::new(runner),
            Duration::from_secs(60),
            rx,
            metrics.clone(),
        );

        Fixture {
            executor,
            metrics,
            shutdown,
        }
    }

    #[tokio::test]
    async fn test_root_cause_is_reported() {
        let Fixture { executor, .. } =
            fixture(&["teku-geth-1", "prysm-geth-1", "lighthouse-besu-1"]);
        let report = executor.execute_target(&Target::new("devnet-1", "geth")).await;

        assert!(!report.is_failed());
        assert_eq!(report.decision, Decision::Notify(Reason::RootCause));
        assert_eq!(
            report.outcome.unwrap().results[0].affected_nodes,
            vec!["teku-geth-1", "prysm-geth-1"]
        );
        assert!(!report.log.is_empty());
    }

    #[tokio::test]
    async fn test_unexplained_respects_target_setting() {
        let Fixture { executor, .. } = fixture(&["teku-besu-1"]);

        let mut target = Target::new("devnet-1", "besu");
        assert_eq!(
            executor.execute_target(&target).await.decision,
            Decision::Skip
        );

        target.alert_unexplained = true;
        assert_eq!(
            executor.execute_target(&target).await.decision,
            Decision::Notify(Reason::Unexplained)
        );
    }

    #[tokio::test]
    async fn test_shutdown_fails_report() {
        let fixture = fixture(&["teku-geth-1"]);
        fixture.shutdown.send(true).unwrap();

        let target = Target::new("devnet-1", "geth");
        let report = fixture.executor.execute_target(&target).await;
        assert!(report.is_failed());
        assert!(!report.should_notify());
    }

    #[tokio::test]
    async fn test_unknown_client_fails_report() {
        let Fixture { executor, .. } = fixture(&[]);
        let report = executor.execute_target(&Target::new("devnet-1", "mystery")).await;

        assert!(report.error_message.unwrap().contains("unknown client"));
    }

    #[tokio::test]
    async fn test_runs_are_counted() {
        let Fixture {
            executor,
            metrics,
            shutdown,
        } = fixture(&["teku-geth-1"]);
        let target = Target::new("devnet-1", "geth");
        let labels = [("network", "devnet-1"), ("client", "geth")];

        executor.execute_target(&target).await;
        executor.execute_target(&target).await;
        assert_eq!(
            metrics.sample("pulse_scheduler_runs_total", &labels),
            Some(2.0)
        );
        assert_eq!(
            metrics.sample("pulse_scheduler_run_duration_seconds", &labels),
            Some(2.0)
        );
        assert_eq!(
            metrics.sample("pulse_scheduler_run_failures_total", &labels),
            None
        );

        shutdown.send(true).unwrap();
        executor.execute_target(&target).await;
        assert_eq!(
            metrics.sample("pulse_scheduler_runs_total", &labels),
            Some(3.0)
        );
        assert_eq!(
            metrics.sample(
                "pulse_scheduler_run_failures_total",
                &[("client", "geth"), ("kind", "cancelled")]
            ),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_invalid_target_is_counted() {
        let Fixture {
            executor, metrics, ..
        } = fixture(&[]);
        executor
            .execute_target(&Target::new("devnet-1", "mystery"))
            .await;

        assert_eq!(
            metrics.sample(
                "pulse_scheduler_run_failures_total",
                &[("client", "mystery"), ("kind", "invalid_target")]
            ),
            Some(1.0)
        );
    }
}
