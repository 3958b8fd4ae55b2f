use std::sync::Arc;

use tracing::info;

use crate::errors::GatewayResult;
use crate::services::rewriter::{FeedRewriter, RewriteOptions};
use crate::sources::FeedUpstream;

/// Feed flavor requested upstream; it is the one that carries media enclosures
pub const FEED_FORMAT: &str = "Mrss";

/// Query parameters consumed by the gateway itself and never forwarded
const GATEWAY_PARAMS: &[&str] = &["remove_existing_media"];

/// Turn an inbound query into the parameters sent upstream: drop the
/// gateway's own flags and force the feed format.
pub fn forward_params(query: &[(String, String)]) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = query
        .iter()
        .filter(|(key, _)| !GATEWAY_PARAMS.contains(&key.as_str()) && key != "format")
        .cloned()
        .collect();
    params.push(("format".to_string(), FEED_FORMAT.to_string()));
    params
}

pub struct FeedService {
    upstream: Arc<dyn FeedUpstream>,
    rewriter: FeedRewriter,
}

impl FeedService {
    pub fn new(upstream: Arc<dyn FeedUpstream>, rewriter: FeedRewriter) -> Self {
        Self { upstream, rewriter }
    }

    /// Fetch the feed for `query` upstream and rewrite it.
    /// Nothing is returned unless the rewrite succeeded.
    pub async fn fetch_rewritten(
        &self,
        query: &[(String, String)],
        options: &RewriteOptions<'_>,
        base_url: &str,
    ) -> GatewayResult<Vec<u8>> {
        let params = forward_params(query);
        let body = self.upstream.fetch(&params).await?;

        let rewritten = self.rewriter.rewrite(body.as_bytes(), options, base_url)?;
        info!(
            upstream_bytes = body.len(),
            rewritten_bytes = rewritten.len(),
            "feed rewritten"
        );

        Ok(rewritten)
    }
}
