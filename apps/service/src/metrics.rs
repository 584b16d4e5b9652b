//! Prometheus instrumentation for scheduled runs, Grafana calls and alerts.
//!
//! Collectors live on the registry owned by [`Metrics`], not on the process
//! default registry.

use std::time::Duration;

use chrono::Utc;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::config::Target;

const NAMESPACE: &str = "pulse";

const RUN_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];
const API_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

pub struct Metrics {
    registry: Registry,
    runs: IntCounterVec,
    run_failures: IntCounterVec,
    run_duration: HistogramVec,
    last_run: GaugeVec,
    api_requests: IntCounterVec,
    api_errors: IntCounterVec,
    api_duration: HistogramVec,
    decisions: IntCounterVec,
    alert_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let runs = IntCounterVec::new(
            opts("scheduler", "runs_total", "Total number of check runs"),
            &["network", "client"],
        )?;
        let run_failures = IntCounterVec::new(
            opts(
                "scheduler",
                "run_failures_total",
                "Total number of check runs that did not complete",
            ),
            &["network", "client", "kind"],
        )?;
        let run_duration = HistogramVec::new(
            histogram_opts(
                "scheduler",
                "run_duration_seconds",
                "Time taken by a check run",
                RUN_BUCKETS,
            ),
            &["network", "client"],
        )?;
        let last_run = GaugeVec::new(
            opts(
                "scheduler",
                "last_run_timestamp_seconds",
                "Unix time the last check run finished",
            ),
            &["network", "client"],
        )?;

        let api_requests = IntCounterVec::new(
            opts("api", "requests_total", "Total number of API requests made"),
            &["service", "operation"],
        )?;
        let api_errors = IntCounterVec::new(
            opts(
                "api",
                "request_errors_total",
                "Total number of API request errors",
            ),
            &["service", "operation", "error_type"],
        )?;
        let api_duration = HistogramVec::new(
            histogram_opts(
                "api",
                "request_duration_seconds",
                "Duration of API requests in seconds",
                API_BUCKETS,
            ),
            &["service", "operation"],
        )?;

        let decisions = IntCounterVec::new(
            opts(
                "notifier",
                "decisions_total",
                "Notification decisions taken on run reports",
            ),
            &["network", "client", "decision"],
        )?;
        let alert_failures = IntCounterVec::new(
            opts(
                "notifier",
                "alert_failures_total",
                "Alerts that could not be delivered",
            ),
            &["network", "client"],
        )?;

        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(run_failures.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;
        registry.register(Box::new(last_run.clone()))?;
        registry.register(Box::new(api_requests.clone()))?;
        registry.register(Box::new(api_errors.clone()))?;
        registry.register(Box::new(api_duration.clone()))?;
        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(alert_failures.clone()))?;

        Ok(Self {
            registry,
            runs,
            run_failures,
            run_duration,
            last_run,
            api_requests,
            api_errors,
            api_duration,
            decisions,
            alert_failures,
        })
    }

    /// Count a finished run. `failure` is the error kind of a run that did
    /// not complete.
    pub fn record_run(&self, target: &Target, elapsed: Duration, failure: Option<&str>) {
        let (network, client) = (target.network.as_str(), target.client.as_str());

        self.runs.with_label_values(&[network, client]).inc();
        self.run_duration
            .with_label_values(&[network, client])
            .observe(elapsed.as_secs_f64());
        self.last_run
            .with_label_values(&[network, client])
            .set(Utc::now().timestamp() as f64);

        if let Some(kind) = failure {
            self.run_failures
                .with_label_values(&[network, client, kind])
                .inc();
        }
    }

    pub fn record_api_request(&self, service: &str, operation: &str, elapsed: Duration) {
        self.api_requests
            .with_label_values(&[service, operation])
            .inc();
        self.api_duration
            .with_label_values(&[service, operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_api_error(&self, service: &str, operation: &str, error_type: &str) {
        self.api_errors
            .with_label_values(&[service, operation, error_type])
            .inc();
    }

    pub fn record_decision(&self, target: &Target, decision: &str) {
        self.decisions
            .with_label_values(&[target.network.as_str(), target.client.as_str(), decision])
            .inc();
    }

    pub fn record_alert_failure(&self, target: &Target) {
        self.alert_failures
            .with_label_values(&[target.network.as_str(), target.client.as_str()])
            .inc();
    }

    /// Every collector in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn opts(subsystem: &str, name: &str, help: &str) -> Opts {
    Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(subsystem)
}

fn histogram_opts(subsystem: &str, name: &str, help: &str, buckets: &[f64]) -> HistogramOpts {
    HistogramOpts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(subsystem)
        .buckets(buckets.to_vec())
}

#[cfg(test)]
impl Metrics {
    /// Value of the sample in family `name` carrying all of `labels`. Counters
    /// and gauges give their value, histograms their sample count.
    pub fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        use prometheus::proto::MetricType;

        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == name)?;

        let metric = family.get_metric().iter().find(|metric| {
            labels.iter().all(|(key, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.get_name() == *key && pair.get_value() == *value)
            })
        })?;

        match family.get_field_type() {
            MetricType::COUNTER => Some(metric.get_counter().get_value()),
            MetricType::GAUGE => Some(metric.get_gauge().get_value()),
            MetricType::HISTOGRAM => Some(metric.get_histogram().get_sample_count() as f64),
            _ => None,
        }
    }
}
