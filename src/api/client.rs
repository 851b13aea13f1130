/// Base HTTP client for the portal REST API
use crate::errors::{LiveError, LiveResult};
use crate::logger::{self, LogTag};
use serde_json::Value;
use std::time::Duration;

/// Shared reqwest client pinned to the portal base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> LiveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(LiveError::from)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET a list resource under /api/. Accepts both a plain JSON array
    /// and the paginated `{"results": [...]}` shape the portal returns.
    pub async fn get_list(&self, path: &str) -> LiveResult<Vec<Value>> {
        let url = format!("{}/api/{}/", self.base_url, path.trim_matches('/'));
        logger::debug(LogTag::Api, &format!("GET {}", url));

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LiveError::Http(format!("{} returned {}", url, status)));
        }

        let body: Value = response.json().await?;
        Ok(parse_list_body(body))
    }
}

fn parse_list_body(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_array() {
        let items = parse_list_body(json!([{"id": 1}, {"id": 2}]));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], 1);
    }

    #[test]
    fn test_parse_paginated_results() {
        let items = parse_list_body(json!({
            "count": 2,
            "next": null,
            "results": [{"id": 7}, {"id": 8}],
        }));
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["id"], 8);
    }

    #[test]
    fn test_parse_unexpected_shapes() {
        assert!(parse_list_body(json!({"detail": "not found"})).is_empty());
        assert!(parse_list_body(json!("just a string")).is_empty());
        assert!(parse_list_body(json!(null)).is_empty());
    }
}
