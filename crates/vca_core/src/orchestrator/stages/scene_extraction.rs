//! scene_extraction stage - picks the frames sent to the analyzer.

use std::sync::Arc;

use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::Context;
use crate::services::SceneExtractor;

/// Extracts scenes and selects the grouped set, or the first
/// `max_scenes` flat scenes when there is no grouping.
pub struct SceneExtractionStage {
    extractor: Arc<dyn SceneExtractor>,
    max_scenes: usize,
}

impl SceneExtractionStage {
    pub fn new(extractor: Arc<dyn SceneExtractor>, max_scenes: usize) -> Self {
        Self {
            extractor,
            max_scenes,
        }
    }
}

impl PipelineStage for SceneExtractionStage {
    fn name(&self) -> &str {
        "scene_extraction"
    }

    fn description(&self) -> &str {
        "Extract representative frames"
    }

    fn can_skip(&self, ctx: &Context) -> bool {
        ctx.is_cache_hit()
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        progress.update(0, "Extracting scenes");

        let video = ctx.require_video()?;
        let video_path = video
            .local_path
            .clone()
            .ok_or_else(|| StageError::precondition_failed("video was not downloaded"))?;
        let session_dir = video
            .session_dir
            .clone()
            .ok_or_else(|| StageError::precondition_failed("no session directory"))?;
        let short_form = video.is_short_form();
        if short_form {
            ctx.logger.info("Short-form video, using dense scene detection");
        }

        let logger = Arc::clone(&ctx.logger);
        let extraction = self.extractor.extract_scenes(
            &video_path,
            &session_dir,
            short_form,
            &|line, is_stderr| logger.output_line(line, is_stderr),
        )?;
        let total = extraction.total();
        let (selected, grouped) = extraction.select_for_analysis(self.max_scenes);

        let message = if grouped.is_empty() {
            format!("Extracted {} scenes, analyzing {}", total, selected.len())
        } else {
            format!("Extracted {} scenes in {} groups", total, grouped.len())
        };
        ctx.logger.info(&message);

        let video = ctx.require_video_mut()?;
        video.scenes = selected.clone();
        video.grouped_scenes = grouped;
        ctx.scenes = selected;

        progress.update(100, &message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Scene, Video};
    use crate::orchestrator::testing::FakeSceneExtractor;
    use crate::services::SceneExtraction;

    fn downloaded_ctx(dir: &std::path::Path) -> Context {
        let mut ctx = Context::detached("https://youtu.be/dQw4w9WgXcQ", false);
        let mut video = Video::new("dQw4w9WgXcQ", ctx.url()).with_local_path(dir.join("v.mp4"));
        video.session_dir = Some(dir.to_path_buf());
        ctx.video = Some(video);
        ctx
    }

    #[test]
    fn caps_flat_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let stage = SceneExtractionStage::new(Arc::new(FakeSceneExtractor::flat(14)), 10);
        let mut ctx = downloaded_ctx(dir.path());

        stage
            .execute(&mut ctx, &StageProgress::unbound("scene_extraction"))
            .unwrap();

        assert_eq!(ctx.scenes.len(), 10);
        assert_eq!(ctx.video.as_ref().unwrap().scene_count(), 10);
        assert_eq!(ctx.video.as_ref().unwrap().grouped_scene_count(), 0);
        assert!(ctx.logger.get_tail().iter().any(|l| l.contains("pts_time")));
    }

    #[test]
    fn grouped_scenes_are_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let all: Vec<Scene> = (0..20).map(|i| Scene::new(i as f64, format!("s{}.jpg", i))).collect();
        let grouped = all[..12].to_vec();
        let extractor = FakeSceneExtractor::returning(SceneExtraction::Grouped { all, grouped });
        let stage = SceneExtractionStage::new(Arc::new(extractor), 10);
        let mut ctx = downloaded_ctx(dir.path());

        stage
            .execute(&mut ctx, &StageProgress::unbound("scene_extraction"))
            .unwrap();

        assert_eq!(ctx.scenes.len(), 12);
        assert_eq!(ctx.video.as_ref().unwrap().grouped_scene_count(), 12);
    }

    #[test]
    fn requires_downloaded_file() {
        let stage = SceneExtractionStage::new(Arc::new(FakeSceneExtractor::flat(1)), 10);
        let mut ctx = Context::detached("u", false);
        ctx.video = Some(Video::new("x", "u"));

        let err = stage
            .execute(&mut ctx, &StageProgress::unbound("scene_extraction"))
            .unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));
    }
}
