//! Metric queries against Grafana's Prometheus datasource.

use anyhow::Result;
use async_trait::async_trait;

pub mod client;
pub mod types;

pub use client::{GrafanaClient, REF_ID};
pub use types::QueryResponse;

/// Source of instant metric queries
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Run a PromQL expression over the recent window
    async fn query(&self, expr: &str) -> Result<QueryResponse>;
}
