//! cache_check stage - restores a stored analysis instead of reprocessing.

use std::sync::Arc;

use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::{Context, StageRecord, CACHE_HIT_KEY};
use crate::services::VideoRepository;

/// Looks up the latest analysis and stored video info.
///
/// A hit needs both. On a hit the result object is rebuilt from the
/// repository and `cache_hit` is recorded; a miss changes nothing. A forced
/// reanalysis runs the stage but never looks at the repository.
pub struct CacheCheckStage {
    repository: Arc<dyn VideoRepository>,
}

impl CacheCheckStage {
    pub fn new(repository: Arc<dyn VideoRepository>) -> Self {
        Self { repository }
    }
}

impl PipelineStage for CacheCheckStage {
    fn name(&self) -> &str {
        "cache_check"
    }

    fn description(&self) -> &str {
        "Reuse a stored analysis for this video"
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        progress.update(12, "Checking cache");
        if ctx.force_reanalyze {
            ctx.logger.info("Reanalysis forced, ignoring stored analysis");
            return Ok(());
        }

        let video_id = ctx.require_video_id()?.to_string();

        let Some(analysis) = self.repository.get_latest_analysis(&video_id)? else {
            ctx.logger.info("No cached analysis");
            return Ok(());
        };
        let Some(info) = self.repository.get_video_info(&video_id)? else {
            ctx.logger
                .warn("Cached analysis has no stored video info, reprocessing");
            return Ok(());
        };

        progress.update(15, "Found cached analysis");
        ctx.logger.info(&format!(
            "Using analysis from {} ({})",
            analysis.analysis_date.format("%Y-%m-%d %H:%M"),
            analysis.model_used
        ));

        let result = analysis.to_result();
        let mut video = info.to_video();
        video.analysis_result = Some(result.clone());

        ctx.analysis_result = Some(result);
        ctx.video = Some(video);
        ctx.record(CACHE_HIT_KEY, StageRecord::CacheHit);

        progress.update(100, "Loaded from cache");
        Ok(())
    }
}
