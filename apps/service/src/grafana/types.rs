use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Body of a `/api/ds/query` request
#[derive(Debug, Clone, Serialize)]
pub struct QueryPayload {
    pub queries: Vec<Query>,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub ref_id: String,
    pub datasource: Datasource,
    pub expr: String,
    pub max_data_points: u32,
    pub interval_ms: u64,
    pub interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend_format: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Datasource {
    pub uid: String,
}

/// Response of a `/api/ds/query` request, keyed by query ref id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: HashMap<String, QueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub schema: Schema,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

impl QueryResponse {
    /// Label sets of every series returned for `ref_id`
    pub fn labels<'a>(
        &'a self,
        ref_id: &str,
    ) -> impl Iterator<Item = &'a BTreeMap<String, String>> {
        self.results
            .get(ref_id)
            .into_iter()
            .flat_map(|result| &result.frames)
            .flat_map(|frame| &frame.schema.fields)
            .filter_map(|field| field.labels.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_response() {
        let body = r#"{
            "results": {
                "pulse": {
                    "status": 200,
                    "frames": [
                        {
                            "schema": {
                                "fields": [
                                    { "name": "Time", "type": "time" },
                                    {
                                        "name": "Value",
                                        "labels": {
                                            "instance": "fusaka-devnet-3-teku-geth-1",
                                            "ingress_user": "fusaka-devnet-3"
                                        }
                                    }
                                ]
                            },
                            "data": { "values": [[1700000000000], [1]] }
                        }
                    ]
                }
            }
        }"#;

        let response: QueryResponse = serde_json::from_str(body).unwrap();
        let labels: Vec<_> = response.labels("pulse").collect();

        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0]["instance"], "fusaka-devnet-3-teku-geth-1");
        assert_eq!(response.labels("other").count(), 0);
    }

    #[test]
    fn test_encode_payload() {
        let payload = QueryPayload {
            queries: vec![Query {
                ref_id: "pulse".into(),
                datasource: Datasource { uid: "abc".into() },
                expr: "up".into(),
                max_data_points: 1,
                interval_ms: 60000,
                interval: "1m".into(),
                legend_format: None,
            }],
            from: "now-5m".into(),
            to: "now".into(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        let query = &json["queries"][0];
        assert_eq!(query["refId"], "pulse");
        assert_eq!(query["datasource"]["uid"], "abc");
        assert_eq!(query["maxDataPoints"], 1);
        assert_eq!(query["intervalMs"], 60000);
        assert!(query.get("legendFormat").is_none());
        assert_eq!(json["from"], "now-5m");
    }
}
