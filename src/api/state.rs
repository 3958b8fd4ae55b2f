use std::sync::Arc;

use crate::config::Config;
use crate::errors::GatewayResult;
use crate::services::{DownloadResolver, FeedRewriter, FeedService};
use crate::sources::{RssBridge, YtDlp};
use crate::storage::SlotManager;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub feeds: Arc<FeedService>,
    pub resolver: Arc<DownloadResolver>,
    pub slots: SlotManager,
    /// Fixed self URL for enclosures; inferred per request when unset
    pub base_url: Option<String>,
}

impl AppState {
    pub fn new(
        feeds: FeedService,
        resolver: DownloadResolver,
        slots: SlotManager,
        base_url: Option<String>,
    ) -> Self {
        Self {
            feeds: Arc::new(feeds),
            resolver: Arc::new(resolver),
            slots,
            base_url,
        }
    }

    pub fn from_config(config: &Config) -> GatewayResult<Self> {
        let upstream = RssBridge::new(&config.rss_bridge_url, config.upstream_timeout_secs)?;
        let feeds = FeedService::new(
            Arc::new(upstream),
            FeedRewriter::new(config.default_media_namespace()),
        );

        let resolver = DownloadResolver::new(
            Arc::new(YtDlp::new(&config.ytdlp_path)),
            config.constraints.clone(),
        );

        let slots = SlotManager::new(config.download_dir.clone())?;

        Ok(Self::new(
            feeds,
            resolver,
            slots,
            config.download_base_url.clone(),
        ))
    }
}
