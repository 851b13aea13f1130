/// Typed access to the portal's list resources
use super::client::ApiClient;
use crate::config::Config;
use crate::errors::LiveResult;
use crate::errors::LiveError;
use crate::realtime::Fetcher;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Resource fetchers for the society/events portal. Each resource is a
/// list endpoint whose route name doubles as its realtime channel.
#[derive(Debug, Clone)]
pub struct PortalApi {
    client: Arc<ApiClient>,
}

impl PortalApi {
    pub fn new(base_url: &str, timeout_secs: u64) -> LiveResult<Self> {
        Ok(Self {
            client: Arc::new(ApiClient::new(base_url, timeout_secs)?),
        })
    }

    pub fn from_config(cfg: &Config) -> LiveResult<Self> {
        Self::new(&cfg.server.portal_url, cfg.server.api_timeout_secs)
    }

    pub async fn fetch_reports(&self) -> LiveResult<Vec<Value>> {
        self.client.get_list("reports").await
    }

    pub async fn fetch_societies(&self) -> LiveResult<Vec<Value>> {
        self.client.get_list("societies").await
    }

    pub async fn fetch_events(&self) -> LiveResult<Vec<Value>> {
        self.client.get_list("events").await
    }

    /// Adapter for the feeds: a fetch function bound to one resource path
    pub fn fetcher(&self, path: &str) -> Fetcher<Value> {
        let client = Arc::clone(&self.client);
        let path = path.to_string();
        Arc::new(
            move || -> BoxFuture<'static, Result<Vec<Value>, LiveError>> {
                let client = Arc::clone(&client);
                let path = path.clone();
                Box::pin(async move { client.get_list(&path).await })
            },
        )
    }
}
