use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{KgqaError, Result};

/// One result row: the values of the RETURN clause in order.
pub type Row = Vec<Value>;

/// Read-only pattern-matching query collaborator.
///
/// `params` carries the untrusted values (entity names) as bind
/// parameters; the statement text itself is always assembled from
/// static template parts. A failing query is a descriptor-local error
/// and must never abort a whole request.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn query(&self, cypher: &str, params: Value) -> Result<Vec<Row>>;
}

/// Neo4j client over the HTTP transaction API.
#[derive(Debug, Clone)]
pub struct Neo4jHttpStore {
    http: reqwest::Client,
    commit_url: String,
    user: String,
    password: String,
}

impl Neo4jHttpStore {
    /// `base_url` is the HTTP endpoint root, e.g. `http://localhost:7474`.
    pub fn new(base_url: &str, user: &str, password: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            commit_url: format!("{}/db/neo4j/tx/commit", base_url.trim_end_matches('/')),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// Cheap reachability probe.
    pub async fn ping(&self) -> Result<()> {
        self.query("RETURN 1", json!({})).await.map(|_| ())
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn query(&self, cypher: &str, params: Value) -> Result<Vec<Row>> {
        debug!("graph query: {} {}", cypher, params);
        let body = json!({
            "statements": [{
                "statement": cypher,
                "parameters": params,
            }]
        });

        let response = self
            .http
            .post(&self.commit_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| KgqaError::GraphUnreachable(e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| KgqaError::GraphStore(e.to_string()))?;
        parse_commit_response(payload)
    }
}

/// Extract rows from a transaction-commit response, turning the
/// server-side `errors` array into a query error.
fn parse_commit_response(payload: Value) -> Result<Vec<Row>> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if let Some(first) = errors.first() {
            let message = first
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown graph error");
            return Err(KgqaError::GraphStore(message.to_string()));
        }
    }

    let rows = payload
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|result| result.get("data"))
        .and_then(Value::as_array)
        .map(|data| {
            data.iter()
                .filter_map(|entry| entry.get("row").and_then(Value::as_array).cloned())
                .collect()
        })
        .unwrap_or_default();
    Ok(rows)
}

/// First-column string values of a row set, skipping nulls and empty
/// strings. This is the shape every knowledge query returns.
pub fn string_cells(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.first())
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_from_commit_response() {
        let payload = json!({
            "results": [{
                "columns": ["a.名称"],
                "data": [
                    {"row": ["感冒"]},
                    {"row": ["肺炎"]}
                ]
            }],
            "errors": []
        });
        let rows = parse_commit_response(payload).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(string_cells(&rows), vec!["感冒", "肺炎"]);
    }

    #[test]
    fn server_errors_become_query_errors() {
        let payload = json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError", "message": "bad statement"}]
        });
        let err = parse_commit_response(payload).unwrap_err();
        assert!(matches!(err, KgqaError::GraphStore(m) if m == "bad statement"));
    }

    #[test]
    fn missing_results_yield_no_rows() {
        let rows = parse_commit_response(json!({})).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn string_cells_skips_nulls_and_empties() {
        let rows = vec![
            vec![json!("感冒")],
            vec![json!(null)],
            vec![json!("")],
            vec![],
        ];
        assert_eq!(string_cells(&rows), vec!["感冒"]);
    }
}
