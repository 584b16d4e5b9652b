use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use pulse::notify::{Decision, Reason};
use tokio::sync::mpsc;

use crate::metrics::Metrics;
use crate::monitoring::TargetReport;

/// Delivers alerts for reports that warrant one
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &TargetReport) -> Result<()>;
}

/// Writes alerts to the process log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &TargetReport) -> Result<()> {
        let Some(outcome) = &report.outcome else {
            return Ok(());
        };

        let failing: Vec<&str> = outcome.results.iter().map(|r| r.name.as_str()).collect();

        tracing::warn!(
            run_id = %report.run_id,
            network = %report.target.network,
            client = %report.target.client,
            root_causes = ?outcome.analysis.root_cause,
            unexplained = ?outcome.analysis.unexplained_issues,
            failing_checks = ?failing,
            "{}",
            report.decision
        );

        Ok(())
    }
}

/// Label a report is counted under in the decision metrics
fn decision_label(report: &TargetReport) -> &'static str {
    if report.is_failed() {
        return "failed";
    }

    match report.decision {
        Decision::Notify(Reason::RootCause) => "root_cause",
        Decision::Notify(Reason::Unexplained) => "unexplained",
        Decision::Skip => "skip",
    }
}

/// Consume reports until every sender is gone, alerting through `notifier`
pub async fn forward_reports(
    mut rx: mpsc::Receiver<TargetReport>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
) {
    while let Some(report) = rx.recv().await {
        metrics.record_decision(&report.target, decision_label(&report));

        if let Some(error) = &report.error_message {
            tracing::error!(
                run_id = %report.run_id,
                network = %report.target.network,
                client = %report.target.client,
                "Check run did not complete: {}",
                error
            );
            continue;
        }

        if !report.should_notify() {
            tracing::info!(
                run_id = %report.run_id,
                network = %report.target.network,
                client = %report.target.client,
                "{}",
                report.decision
            );
            continue;
        }

        if let Err(e) = notifier.notify(&report).await {
            metrics.record_alert_failure(&report.target);
            tracing::error!("Failed to send alert for {}: {}", report.target, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use anyhow::anyhow;
    use pulse::{AnalysisResult, Dimension, RunOutcome};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, report: &TargetReport) -> Result<()> {
            self.0.lock().unwrap().push(report.target.to_string());
            Ok(())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Notifier for Unreachable {
        async fn notify(&self, _report: &TargetReport) -> Result<()> {
            Err(anyhow!("webhook unreachable"))
        }
    }

    fn report(client: &str, root_cause: &[&str]) -> TargetReport {
        let outcome = RunOutcome {
            id: "run".into(),
            network: "devnet-1".into(),
            target: client.into(),
            dimension: Dimension::of_client(client).unwrap(),
            results: Vec::new(),
            analysis: AnalysisResult {
                root_cause: root_cause.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        };
        TargetReport::new(Target::new("devnet-1", client), "run").completed(outcome)
    }

    #[tokio::test]
    async fn test_only_alerting_reports_are_forwarded() {
        let (tx, rx) = mpsc::channel(8);
        let notifier = Arc::new(Recording::default());

        let alerting = report("geth", &["geth"]);
        assert_eq!(alerting.decision, Decision::Notify(Reason::RootCause));

        tx.send(alerting).await.unwrap();
        tx.send(report("teku", &["geth"])).await.unwrap();
        let failed = TargetReport::new(Target::new("devnet-1", "besu"), "run")
            .failed("deadline");
        tx.send(failed).await.unwrap();
        drop(tx);

        let metrics = Arc::new(Metrics::new().unwrap());
        forward_reports(rx, notifier.clone(), metrics.clone()).await;

        assert_eq!(*notifier.0.lock().unwrap(), vec!["devnet-1/geth"]);

        let decisions = "pulse_notifier_decisions_total";
        let expected = [
            ("geth", "root_cause"),
            ("teku", "skip"),
            ("besu", "failed"),
        ];
        for (client, decision) in expected {
            assert_eq!(
                metrics.sample(decisions, &[("client", client), ("decision", decision)]),
                Some(1.0),
                "{client}"
            );
        }
    }

    #[tokio::test]
    async fn test_alert_failures_are_counted() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(report("geth", &["geth"])).await.unwrap();
        drop(tx);

        let metrics = Arc::new(Metrics::new().unwrap());
        forward_reports(rx, Arc::new(Unreachable), metrics.clone()).await;

        assert_eq!(
            metrics.sample(
                "pulse_notifier_alert_failures_total",
                &[("network", "devnet-1"), ("client", "geth")]
            ),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_reports() {
        LogNotifier.notify(&report("prysm", &["prysm"])).await.unwrap();
        LogNotifier
            .notify(&TargetReport::new(Target::new("devnet-1", "prysm"), "run"))
            .await
            .unwrap();
    }
}
