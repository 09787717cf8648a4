//! ai_analysis stage - classifies the video from its scenes.

use std::sync::Arc;

use crate::models::{AiProvider, AnalysisRecord};
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::Context;
use crate::services::{VideoRepository, VisionAnalyzer};

/// Frame file names stored with each analysis.
const MAX_RECORDED_SCENES: usize = 10;

/// Runs the vision analyzer and stores the result.
///
/// No scenes, or no usable answer from the model, is a warning rather
/// than a failure.
pub struct AiAnalysisStage {
    analyzer: Box<dyn VisionAnalyzer>,
    repository: Arc<dyn VideoRepository>,
}

impl AiAnalysisStage {
    pub fn new(analyzer: Box<dyn VisionAnalyzer>, repository: Arc<dyn VideoRepository>) -> Self {
        Self {
            analyzer,
            repository,
        }
    }

    pub fn provider(&self) -> AiProvider {
        self.analyzer.provider()
    }
}

impl PipelineStage for AiAnalysisStage {
    fn name(&self) -> &str {
        "ai_analysis"
    }

    fn description(&self) -> &str {
        "Classify the video with a vision model"
    }

    fn can_skip(&self, ctx: &Context) -> bool {
        ctx.is_cache_hit()
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        let video_id = ctx.require_video_id()?.to_string();
        let video = ctx.require_video()?;
        if video.scenes.is_empty() {
            ctx.logger.warn("No scenes to analyze");
            return Ok(());
        }

        let model = self.analyzer.model();
        progress.update(
            0,
            &format!("Analyzing with {}", AiProvider::model_display_name(model)),
        );

        let analyzed_scenes: Vec<String> = video
            .scenes
            .iter()
            .take(MAX_RECORDED_SCENES)
            .map(|s| s.frame_file_name())
            .collect();

        let Some(result) = self.analyzer.analyze(video)? else {
            ctx.logger.warn("Analyzer returned no result");
            progress.update(80, "No analysis result");
            progress.update(100, "AI analysis finished");
            return Ok(());
        };

        let record = AnalysisRecord::from_result(
            &video_id,
            &result,
            analyzed_scenes,
            format!("{}:unknown", self.analyzer.provider()),
        );
        self.repository.save_analysis(&record)?;

        ctx.logger.info(&format!(
            "Genre: {} ({} tags, model {})",
            result.genre,
            result.tags.len(),
            record.model_used
        ));
        progress.update(70, &format!("Genre: {}", result.genre));

        ctx.require_video_mut()?.analysis_result = Some(result.clone());
        ctx.analysis_result = Some(result);

        progress.update(100, "AI analysis finished");
        Ok(())
    }
}
