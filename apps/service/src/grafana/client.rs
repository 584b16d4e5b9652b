use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use super::MetricsSource;
use super::types::{Datasource, Query, QueryPayload, QueryResponse};
use crate::config;
use crate::metrics::Metrics;

/// Ref id every metric query is sent under
pub const REF_ID: &str = "pulse";

const SERVICE: &str = "grafana";
const API_PATH: &str = "/api/ds/query";
const MAX_DATA_POINTS: u32 = 1;
const INTERVAL_MS: u64 = 60_000;
const INTERVAL: &str = "1m";
const TIME_FROM: &str = "now-5m";
const TIME_TO: &str = "now";

/// Prometheus queries through Grafana's datasource proxy
pub struct GrafanaClient {
    http: reqwest::Client,
    base_url: String,
    datasource_id: String,
    token: Option<String>,
    metrics: Arc<Metrics>,
}

impl GrafanaClient {
    pub fn new(
        config: &config::Grafana,
        token: Option<String>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            datasource_id: config.datasource_id.clone(),
            token,
            metrics,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn payload(&self, expr: &str) -> QueryPayload {
        QueryPayload {
            queries: vec![Query {
                ref_id: REF_ID.to_string(),
                datasource: Datasource {
                    uid: self.datasource_id.clone(),
                },
                expr: expr.to_string(),
                max_data_points: MAX_DATA_POINTS,
                interval_ms: INTERVAL_MS,
                interval: INTERVAL.to_string(),
                legend_format: Some("({{ingress_user}}) {{instance}}".to_string()),
            }],
            from: TIME_FROM.to_string(),
            to: TIME_TO.to_string(),
        }
    }
}

#[async_trait]
impl MetricsSource for GrafanaClient {
    async fn query(&self, expr: &str) -> Result<QueryResponse> {
        let mut request = self
            .http
            .post(format!("{}{API_PATH}", self.base_url))
            .json(&self.payload(expr));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let started = Instant::now();
        let sent = request.send().await;
        self.metrics
            .record_api_request(SERVICE, API_PATH, started.elapsed());

        let response = sent.map_err(|e| {
            self.metrics
                .record_api_error(SERVICE, API_PATH, "network_error");
            anyhow!("Grafana request failed: {}", e)
        })?;

        let status = response.status();
        if !status.is_success() {
            self.metrics.record_api_error(
                SERVICE,
                API_PATH,
                &format!("http_{}", status.as_u16()),
            );
            let body = response.text().await.unwrap_or_default();
            bail!("unexpected status code {}: {}", status.as_u16(), body.trim());
        }

        response.json::<QueryResponse>().await.map_err(|e| {
            self.metrics
                .record_api_error(SERVICE, API_PATH, "decode_error");
            anyhow::Error::new(e).context("failed to decode Grafana response")
        })
    }
}
