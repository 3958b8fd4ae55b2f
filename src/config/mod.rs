use std::path::PathBuf;

use crate::domain::DownloadConstraints;
use crate::errors::{GatewayError, GatewayResult};

/// Namespace used for injected enclosures when neither the document nor the
/// configuration names one.
pub const DEFAULT_MEDIA_NAMESPACE: &str = "http://search.yahoo.com/mrss/";

/// Encoding of every rewritten feed.
pub const ENCODING: &str = "UTF-8";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub rss_bridge_url: String,
    pub download_base_url: Option<String>,
    pub constraints: DownloadConstraints,
    pub media_namespace: Option<String>,
    pub download_dir: PathBuf,
    pub ytdlp_path: String,
    pub upstream_timeout_secs: u64,
}

impl Config {
    /// Get the directory where the executable is located
    fn exe_dir() -> Option<PathBuf> {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Load `.env` files, then read the process environment.
    pub fn from_env() -> GatewayResult<Self> {
        // Try to load .env from executable's directory first
        if let Some(dir) = Self::exe_dir() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                dotenvy::from_path(&env_path).ok();
            }
        }
        // Fall back to current directory
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rss_bridge_url = var("RSS_BRIDGE_URL")
            .ok_or_else(|| GatewayError::MissingEnvVar("RSS_BRIDGE_URL".to_string()))?;
        url::Url::parse(&rss_bridge_url).map_err(|e| {
            GatewayError::Config(format!("RSS_BRIDGE_URL is not a valid URL: {}", e))
        })?;

        let download_base_url = var("DOWNLOAD_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string());

        let max_duration_secs = var("DURATION_MAX")
            .map(|v| parse_positive("DURATION_MAX", &v))
            .transpose()?;

        let format_sort = var("YTDLP_FORMAT_SORT")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|rule| !rule.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let constraints = DownloadConstraints {
            max_duration_secs,
            format: var("YTDLP_FORMAT"),
            format_sort,
        };

        let download_dir = var("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("mediafeed"));

        let upstream_timeout_secs = var("UPSTREAM_TIMEOUT_SECS")
            .map(|v| parse_positive("UPSTREAM_TIMEOUT_SECS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        Ok(Self {
            rss_bridge_url,
            download_base_url,
            constraints,
            media_namespace: var("MEDIA_NAMESPACE"),
            download_dir,
            ytdlp_path: var("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            upstream_timeout_secs,
        })
    }

    /// Configured default namespace, falling back to the MRSS namespace.
    pub fn default_media_namespace(&self) -> &str {
        self.media_namespace
            .as_deref()
            .unwrap_or(DEFAULT_MEDIA_NAMESPACE)
    }
}

fn parse_positive(key: &str, value: &str) -> GatewayResult<u64> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(GatewayError::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}
