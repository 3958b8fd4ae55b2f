use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Artifact, ArtifactKind, DownloadConstraints};
use crate::errors::GatewayResult;
use crate::sources::{ExtractionParams, MediaExtractor};
use crate::storage::SlotGuard;

/// Turns a source URL into a file in a download slot.
///
/// The full media is tried first; when the backend declines it (duration
/// filter, unavailable formats, geo-blocking) the thumbnail is fetched
/// instead. Blocking: run it off the async executor.
pub struct DownloadResolver {
    extractor: Arc<dyn MediaExtractor>,
    constraints: DownloadConstraints,
}

impl DownloadResolver {
    pub fn new(extractor: Arc<dyn MediaExtractor>, constraints: DownloadConstraints) -> Self {
        Self {
            extractor,
            constraints,
        }
    }

    /// Resolve `source_url` into the slot held by `slot`.
    ///
    /// `Ok(None)` means no content is available, which is not a fault.
    /// Hard backend failures are returned as errors; the slot guard still
    /// cleans up whatever was written.
    pub fn resolve(&self, source_url: &str, slot: &SlotGuard) -> GatewayResult<Option<Artifact>> {
        let slots = slot.slots();
        let stem = slot.stem();

        let video = ExtractionParams::video(slots.dir(), stem, &self.constraints);
        if let Some(path) = self.attempt(source_url, &video, slot)? {
            info!(slot = %stem, url = %source_url, "video downloaded");
            return Ok(Some(Artifact::new(path, ArtifactKind::Video)));
        }

        // Partial video files must not outlive the failed attempt
        slots.release(stem)?;

        let thumbnail = ExtractionParams::thumbnail(slots.dir(), stem);
        if let Some(path) = self.attempt(source_url, &thumbnail, slot)? {
            info!(slot = %stem, url = %source_url, "falling back to thumbnail");
            return Ok(Some(Artifact::new(path, ArtifactKind::Thumbnail)));
        }

        warn!(slot = %stem, url = %source_url, "no video or thumbnail available");
        Ok(None)
    }

    fn attempt(
        &self,
        source_url: &str,
        params: &ExtractionParams,
        slot: &SlotGuard,
    ) -> GatewayResult<Option<PathBuf>> {
        match self.extractor.extract(source_url, params) {
            Ok(()) => slot.slots().find_file(slot.stem()),
            Err(e) if e.is_soft() => {
                warn!(slot = %slot.stem(), thumbnail = params.thumbnail_only, error = %e, "extraction declined");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
