//! url_parse stage - resolves the platform and native video id.

use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::Context;
use crate::services::parse_video_url;

/// Resolves the input URL. Never skipped.
pub struct UrlParseStage;

impl UrlParseStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UrlParseStage {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStage for UrlParseStage {
    fn name(&self) -> &str {
        "url_parse"
    }

    fn description(&self) -> &str {
        "Resolve platform and video id from the URL"
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        progress.update(5, "Parsing URL");

        let parsed = parse_video_url(ctx.url())?;
        ctx.logger.info(&format!(
            "{} video: {}",
            parsed.platform.display_name(),
            parsed.video_id
        ));
        progress.update(
            10,
            &format!("{} video: {}", parsed.platform.display_name(), parsed.video_id),
        );

        ctx.platform = Some(parsed.platform);
        ctx.video_id = Some(parsed.video_id);
        Ok(())
    }
}
