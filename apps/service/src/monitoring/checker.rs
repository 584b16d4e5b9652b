use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pulse::checks::detail_keys;
use pulse::{Category, Check, CheckConfig, CheckResult, Dimension, RunContext};

use crate::grafana::{MetricsSource, QueryResponse, REF_ID};

/// A metric query: a PromQL template whose matching series are the
/// unhealthy nodes.
///
/// Templates take `{network}`, `{consensus}` and `{execution}` placeholders,
/// filled from the selectors of the run's [`CheckConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricQuery {
    pub name: &'static str,
    pub label: &'static str,
    pub dimension: Dimension,
    pub category: Category,
    pub query: &'static str,
    pub pass: &'static str,
    pub fail: &'static str,
    pub node_key: &'static str,
    pub node_log: &'static str,
}

impl MetricQuery {
    pub fn render(&self, config: &CheckConfig) -> String {
        self.query
            .replace("{network}", &config.network)
            .replace("{consensus}", config.consensus.pattern())
            .replace("{execution}", config.execution.pattern())
    }
}

pub const CL_SYNC: MetricQuery = MetricQuery {
    name: "Node failing to sync",
    label: "CL sync",
    dimension: Dimension::Consensus,
    category: Category::Sync,
    query: r#"
	count by (instance, ingress_user, consensus_client, execution_client)(
		eth_con_sync_is_syncing{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"} == 1
	)
"#,
    pass: "All CL nodes are synced",
    fail: "The following CL nodes are not synced",
    node_key: detail_keys::NOT_SYNCED_NODES,
    node_log: "Unsynced node",
};

pub const CL_HEAD_SLOT: MetricQuery = MetricQuery {
    name: "Head slot not advancing",
    label: "CL head slot",
    dimension: Dimension::Consensus,
    category: Category::Sync,
    query: r#"
	(increase(
		beacon_head_slot{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"}[5m]
	) == 0) + 1
"#,
    pass: "All CL nodes are advancing properly",
    fail: "The following CL nodes are not advancing their head slot",
    node_key: detail_keys::STUCK_NODES,
    node_log: "Not advancing head slot",
};

pub const CL_FINALIZED_EPOCH: MetricQuery = MetricQuery {
    name: "Finalized epoch not advancing",
    label: "CL finalized epoch",
    dimension: Dimension::Consensus,
    category: Category::Sync,
    query: r#"
	beacon_finalized_epoch{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"}
	- on (network)
	group_right(instance, consensus_client, execution_client, ingress_user)
	max(beacon_finalized_epoch{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"}) by (network) < -4
"#,
    pass: "All CL nodes are finalizing properly",
    fail: "The following CL nodes are not finalizing",
    node_key: detail_keys::STUCK_NODES,
    node_log: "Not finalizing",
};

pub const CL_PEER_COUNT: MetricQuery = MetricQuery {
    name: "Low peer count",
    label: "CL peer count",
    dimension: Dimension::Consensus,
    category: Category::Sync,
    query: r#"
	sum by (instance, ingress_user)(libp2p_peers{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"} ) < 5
"#,
    pass: "All CL nodes have sufficient peers",
    fail: "The following CL nodes have low peer count",
    node_key: detail_keys::LOW_PEER_NODES,
    node_log: "Low peer count",
};

pub const EL_SYNC: MetricQuery = MetricQuery {
    name: "Node failing to sync",
    label: "EL sync",
    dimension: Dimension::Execution,
    category: Category::Sync,
    query: r#"
	count by (instance, ingress_user, consensus_client, execution_client)(
		eth_exe_sync_is_syncing{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"} == 1
	)
"#,
    pass: "All EL nodes are synced",
    fail: "The following EL nodes are not synced",
    node_key: detail_keys::NOT_SYNCED_NODES,
    node_log: "Unsynced node",
};

pub const EL_BLOCK_HEIGHT: MetricQuery = MetricQuery {
    name: "Block height not advancing",
    label: "EL block height",
    dimension: Dimension::Execution,
    category: Category::Sync,
    query: r#"
	eth_exe_block_most_recent_number{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"}
	- on (network)
	group_right(instance, consensus_client, execution_client, ingress_user)
	max(eth_exe_block_most_recent_number{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"}) by (network) < -5
"#,
    pass: "All EL nodes are advancing properly",
    fail: "The following EL nodes are not advancing",
    node_key: detail_keys::STUCK_NODES,
    node_log: "Not advancing block height",
};

pub const EL_PEER_COUNT: MetricQuery = MetricQuery {
    name: "Low peer count",
    label: "EL peer count",
    dimension: Dimension::Execution,
    category: Category::Sync,
    query: r#"
	eth_exe_net_peer_count{network=~"{network}", consensus_client=~"{consensus}", execution_client=~"{execution}", ingress_user!~"synctest.*"} < 5
"#,
    pass: "All EL nodes have sufficient peers",
    fail: "The following EL nodes have low peer count",
    node_key: detail_keys::LOW_PEER_NODES,
    node_log: "Low peer count",
};

/// Every metric query, in the order they are registered
pub const METRIC_QUERIES: &[MetricQuery] = &[
    CL_SYNC,
    CL_HEAD_SLOT,
    CL_FINALIZED_EPOCH,
    CL_PEER_COUNT,
    EL_SYNC,
    EL_BLOCK_HEIGHT,
    EL_PEER_COUNT,
];

/// A [`MetricQuery`] bound to a metrics source
pub struct MetricCheck {
    metric: MetricQuery,
    source: Arc<dyn MetricsSource>,
}

impl MetricCheck {
    pub fn new(metric: MetricQuery, source: Arc<dyn MetricsSource>) -> Self {
        Self { metric, source }
    }
}

/// One check per known metric query, all reading from `source`
pub fn default_checks(source: Arc<dyn MetricsSource>) -> Vec<Arc<dyn Check>> {
    METRIC_QUERIES
        .iter()
        .map(|metric| Arc::new(MetricCheck::new(*metric, source.clone())) as Arc<dyn Check>)
        .collect()
}

/// Node names of every returned series, in response order.
///
/// The `instance` label carries the ingress user as a prefix, which is
/// dropped so names read `<consensus>-<execution>[-<n>]`.
pub fn affected_nodes(response: &QueryResponse) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut nodes = Vec::new();

    for labels in response.labels(REF_ID) {
        let Some(instance) = labels.get("instance").filter(|i| !i.is_empty()) else {
            continue;
        };

        let node = match labels.get("ingress_user").filter(|u| !u.is_empty()) {
            Some(user) => instance.replace(&format!("{user}-"), ""),
            None => instance.clone(),
        };

        if seen.insert(node.clone()) {
            nodes.push(node);
        }
    }

    nodes
}

#[async_trait]
impl Check for MetricCheck {
    fn name(&self) -> &str {
        self.metric.name
    }

    fn category(&self) -> Category {
        self.metric.category
    }

    fn dimension(&self) -> Dimension {
        self.metric.dimension
    }

    async fn run(&self, ctx: &RunContext, config: &CheckConfig) -> Result<CheckResult> {
        let query = self.metric.render(config);
        let log = ctx.log();

        log.record(format!("\n=== Running {} check", self.metric.label));

        let response = self.source.query(&query).await.context("failed to execute query")?;
        let nodes = affected_nodes(&response);

        if nodes.is_empty() {
            log.record(format!("  - {}", self.metric.pass));
            return Ok(CheckResult::ok(self.metric.name, self.metric.category, self.metric.pass)
                .with_detail(detail_keys::QUERY, query));
        }

        for node in &nodes {
            log.record(format!("  - {}: {node}", self.metric.node_log));
        }

        Ok(CheckResult::fail(self.metric.name, self.metric.category, self.metric.fail, nodes)
            .with_detail(detail_keys::QUERY, query)
            .with_node_list(self.metric.node_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use pulse::{Selector, Status};
    use std::sync::Mutex;

    struct FakeSource {
        body: Option<&'static str>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetricsSource for FakeSource {
        async fn query(&self, expr: &str) -> Result<QueryResponse> {
            self.queries.lock().unwrap().push(expr.to_string());
            let body = self.body.ok_or_else(|| anyhow!("connection refused"))?;
            Ok(serde_json::from_str(body)?)
        }
    }

    fn source(body: Option<&'static str>) -> Arc<FakeSource> {
        Arc::new(FakeSource {
            body,
            queries: Mutex::new(Vec::new()),
        })
    }

    const TWO_NODES: &str = r#"{"results":{"pulse":{"frames":[
        {"schema":{"fields":[{"labels":{"instance":"devnet-1-teku-geth-1","ingress_user":"devnet-1"}}]}},
        {"schema":{"fields":[{"labels":{"instance":"lighthouse-besu-2","ingress_user":""}}]}},
        {"schema":{"fields":[{"labels":{"instance":"devnet-1-teku-geth-1","ingress_user":"devnet-1"}}]}},
        {"schema":{"fields":[{"labels":{"job":"no-instance"}}]}}
    ]}}}"#;

    #[test]
    fn test_render_fills_selectors() {
        let config = CheckConfig::new("devnet-1", Selector::All, Selector::role("geth"));
        let query = EL_PEER_COUNT.render(&config);

        assert!(query.contains(r#"network=~"devnet-1""#));
        assert!(query.contains(r#"consensus_client=~".*""#));
        assert!(query.contains(r#"execution_client=~"geth""#));
    }

    #[test]
    fn test_every_query_renders_all_placeholders() {
        let config = CheckConfig::new("devnet-1", Selector::All, Selector::All);
        for metric in METRIC_QUERIES {
            let query = metric.render(&config);
            for placeholder in ["{network}", "{consensus}", "{execution}"] {
                assert!(
                    !query.contains(placeholder),
                    "{} left {placeholder}",
                    metric.label
                );
            }
        }
    }

    #[test]
    fn test_affected_nodes_strips_ingress_user() {
        let response: QueryResponse = serde_json::from_str(TWO_NODES).unwrap();
        assert_eq!(
            affected_nodes(&response),
            vec!["teku-geth-1", "lighthouse-besu-2"]
        );
    }

    #[tokio::test]
    async fn test_failing_run() {
        let source = source(Some(TWO_NODES));
        let check = MetricCheck::new(CL_SYNC, source.clone());
        let ctx = RunContext::new();

        let config = CheckConfig::new("devnet-1", Selector::All, Selector::All);

        let result = check.run(&ctx, &config).await.unwrap();

        assert_eq!(result.status, Status::Fail);
        assert_eq!(
            result.affected_nodes,
            vec!["teku-geth-1", "lighthouse-besu-2"]
        );
        assert_eq!(
            result.details[detail_keys::NOT_SYNCED_NODES],
            "teku-geth-1\nlighthouse-besu-2"
        );
        assert_eq!(
            result.details[detail_keys::QUERY],
            source.queries.lock().unwrap()[0]
        );
        assert!(ctx.log().contents().contains("Unsynced node: teku-geth-1"));
    }

    #[tokio::test]
    async fn test_passing_run() {
        let check = MetricCheck::new(EL_BLOCK_HEIGHT, source(Some(r#"{"results":{}}"#)));
        let config = CheckConfig::new("devnet-1", Selector::All, Selector::All);
        let result = check.run(&RunContext::new(), &config).await.unwrap();

        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.description, "All EL nodes are advancing properly");
        assert!(result.affected_nodes.is_empty());
    }

    #[tokio::test]
    async fn test_source_error_is_propagated() {
        let check = MetricCheck::new(CL_PEER_COUNT, source(None));
        let config = CheckConfig::new("devnet-1", Selector::All, Selector::All);
        let err = check.run(&RunContext::new(), &config).await.unwrap_err();

        assert!(format!("{err:#}").contains("connection refused"));
    }

    #[test]
    fn test_default_checks_cover_both_dimensions() {
        let checks = default_checks(source(None));
        assert_eq!(checks.len(), 7);
        assert_eq!(
            checks.iter().filter(|c| c.dimension() == Dimension::Consensus).count(),
            4
        );
        assert_eq!(
            checks.iter().filter(|c| c.dimension() == Dimension::Execution).count(),
            3
        );
    }
}
