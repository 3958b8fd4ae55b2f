use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::errors::{GatewayError, GatewayResult};
use crate::sources::traits::FeedUpstream;

/// RSS-Bridge style aggregation backend reached over HTTP.
pub struct RssBridge {
    client: Client,
    endpoint: String,
}

impl RssBridge {
    pub fn new(endpoint: &str, timeout_secs: u64) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GatewayError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl FeedUpstream for RssBridge {
    async fn fetch(&self, params: &[(String, String)]) -> GatewayResult<String> {
        debug!(endpoint = %self.endpoint, ?params, "fetching upstream feed");

        let response = self.client.get(&self.endpoint).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamFeed(format!(
                "{} returned {}",
                self.endpoint, status
            )));
        }

        Ok(response.text().await?)
    }
}
