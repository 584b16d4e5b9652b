use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};

use super::executor::MonitoringExecutor;
use super::types::TargetReport;
use crate::config::Target;

/// Monitoring scheduler - runs every target on a fixed interval
pub struct MonitoringScheduler {
    executor: Arc<MonitoringExecutor>,
    report_tx: mpsc::Sender<TargetReport>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl MonitoringScheduler {
    pub fn new(
        executor: Arc<MonitoringExecutor>,
        report_tx: mpsc::Sender<TargetReport>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            executor,
            report_tx,
            interval,
            shutdown,
        }
    }

    /// Schedule a single target for periodic checking. The first run starts
    /// immediately. The task ends on shutdown, when the shutdown sender is
    /// dropped, or when reports can no longer be delivered.
    pub fn schedule_target(&self, target: Target) -> tokio::task::JoinHandle<()> {
        let executor = self.executor.clone();
        let report_tx = self.report_tx.clone();
        let mut shutdown = self.shutdown.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                if *shutdown.borrow() {
                    break;
                }

                let report = executor.execute_target(&target).await;

                if let Err(e) = report_tx.send(report).await {
                    tracing::error!("Failed to send target report: {}", e);
                    break;
                }
            }

            tracing::debug!(
                network = %target.network,
                client = %target.client,
                "Target schedule stopped"
            );
        })
    }

    /// Schedule multiple targets
    pub fn schedule_targets(&self, targets: Vec<Target>) -> Vec<tokio::task::JoinHandle<()>> {
        targets
            .into_iter()
            .map(|target| self.schedule_target(target))
            .collect()
    }
}
