use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{DownloadConstraints, SlotStem};
use crate::errors::GatewayResult;

/// The feed-aggregation backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedUpstream: Send + Sync {
    /// Fetch a feed document using already-prepared query parameters
    async fn fetch(&self, params: &[(String, String)]) -> GatewayResult<String>;
}

/// The media-extraction backend.
///
/// An `Ok` return only means the backend ran to completion. Whether it left a
/// file behind is for the caller to check, since filtered or skipped sources
/// also complete without an error.
#[cfg_attr(test, mockall::automock)]
pub trait MediaExtractor: Send + Sync {
    fn extract(&self, source_url: &str, params: &ExtractionParams) -> Result<(), ExtractionError>;
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to start extraction backend: {0}")]
    Spawn(#[from] std::io::Error),

    /// The source exists but offers nothing we may fetch (geo-blocked,
    /// no matching format, not live yet, ...)
    #[error("Media unavailable: {0}")]
    Unavailable(String),

    #[error("Extraction backend exited with {code}: {message}")]
    Failed { code: String, message: String },
}

impl ExtractionError {
    /// Soft failures fall through to the next strategy instead of failing the request
    pub fn is_soft(&self) -> bool {
        matches!(self, ExtractionError::Unavailable(_))
    }
}

/// Parameters for one extraction backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionParams {
    pub output_template: String,
    pub match_filter: Option<String>,
    pub format: Option<String>,
    pub format_sort: Vec<String>,
    pub thumbnail_only: bool,
}

impl ExtractionParams {
    /// Full media download into the slot, honoring the configured constraints
    pub fn video(dir: &Path, stem: &SlotStem, constraints: &DownloadConstraints) -> Self {
        Self {
            output_template: Self::template(dir, stem),
            match_filter: constraints
                .max_duration_secs
                .map(|max| format!("duration<={}", max)),
            format: constraints.format.clone(),
            format_sort: constraints.format_sort.clone(),
            thumbnail_only: false,
        }
    }

    /// Thumbnail-only retrieval into the slot
    pub fn thumbnail(dir: &Path, stem: &SlotStem) -> Self {
        Self {
            output_template: Self::template(dir, stem),
            match_filter: None,
            format: None,
            format_sort: Vec::new(),
            thumbnail_only: true,
        }
    }

    fn template(dir: &Path, stem: &SlotStem) -> String {
        dir.join(format!("{}.%(ext)s", stem))
            .to_string_lossy()
            .into_owned()
    }
}
