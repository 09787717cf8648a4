//! metadata stage - attaches downloader metadata and stores the video info.

use std::sync::Arc;

use crate::models::VideoRecord;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::Context;
use crate::services::VideoRepository;

/// Builds `VideoMetadata` from the download result and saves a `VideoRecord`.
pub struct MetadataStage {
    repository: Arc<dyn VideoRepository>,
}

impl MetadataStage {
    pub fn new(repository: Arc<dyn VideoRepository>) -> Self {
        Self { repository }
    }
}

impl PipelineStage for MetadataStage {
    fn name(&self) -> &str {
        "metadata"
    }

    fn description(&self) -> &str {
        "Store video information"
    }

    fn can_skip(&self, ctx: &Context) -> bool {
        ctx.is_cache_hit()
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        progress.update(40, "Processing metadata");

        let video_id = ctx.require_video_id()?.to_string();
        let platform = ctx.require_platform()?;
        let download = ctx
            .download_result
            .as_ref()
            .ok_or_else(|| StageError::precondition_failed("no download result"))?;

        let metadata = download.to_metadata(&video_id, ctx.url(), platform);
        let record = VideoRecord::from_metadata(ctx.url(), &metadata);
        self.repository.save_video_info(&record)?;

        ctx.logger.info(&format!(
            "{} by {} ({})",
            metadata.title, metadata.uploader, platform
        ));
        ctx.require_video_mut()?.metadata = Some(metadata);

        progress.update(45, "Metadata saved");
        Ok(())
    }
}
