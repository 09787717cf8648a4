//! Pipeline orchestrator for processing video URLs.
//!
//! A run threads one `Context` through an ordered list of stages. Each
//! stage can skip itself from the context (for example after a cache hit),
//! and the first failing stage ends the run.
//!
//! # Architecture
//!
//! ```text
//! Coordinator
//!   └── Pipeline
//!         ├── Stage: url_parse
//!         ├── Stage: cache_check
//!         ├── Stage: download
//!         ├── Stage: metadata
//!         ├── Stage: scene_extraction
//!         ├── Stage: ai_analysis
//!         ├── Stage: storage_upload   (best effort)
//!         ├── Stage: notion_sync      (best effort)
//!         └── Stage: cleanup
//! ```
//!
//! # Example
//!
//! ```ignore
//! use vca_core::orchestrator::{Coordinator, ProgressCallback};
//!
//! let mut coordinator = Coordinator::standard(settings)?;
//! let progress: ProgressCallback = Arc::new(|stage, pct, msg| println!("[{stage}] {pct}% {msg}"));
//! let video = coordinator.process("https://youtu.be/dQw4w9WgXcQ", false, Some(progress))?;
//! println!("Genre: {:?}", video.genre());
//! ```

mod coordinator;
mod errors;
mod pipeline;
mod stage;
pub mod stages;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use coordinator::{Coordinator, PipelineServices};
pub use errors::{PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::{Pipeline, PipelineRunResult};
pub use stage::{PipelineStage, Stage, StageProgress};
pub use stages::{
    AiAnalysisStage, CacheCheckStage, CleanupStage, DownloadStage, MetadataStage,
    NotionSyncStage, SceneExtractionStage, StorageUploadStage, UrlParseStage,
};
pub use types::{
    CleanupSummary, Context, ProgressCallback, StageRecord, StageStatus, SyncSummary,
    UploadSummary, CACHE_HIT_KEY, CLEANUP_KEY, NOTION_SYNC_KEY, STORAGE_UPLOAD_KEY,
};

use crate::config::Settings;
use crate::logging::LogConfig;
use crate::services::VisionAnalyzer;

/// The default stages, in run order.
///
/// 1. url_parse - resolve platform and video id
/// 2. cache_check - restore a stored analysis (ignored when forced)
/// 3. download - fetch the video
/// 4. metadata - store video information
/// 5. scene_extraction - extract frames
/// 6. ai_analysis - classify with `analyzer`
/// 7. storage_upload - upload artifacts
/// 8. notion_sync - sync to Notion
/// 9. cleanup - remove temp files (runs after cache hits too)
pub fn default_stages(
    services: &PipelineServices,
    settings: &Settings,
    analyzer: Box<dyn VisionAnalyzer>,
) -> Vec<Box<dyn PipelineStage>> {
    let temp_root = &settings.paths.temp_root;
    vec![
        Box::new(UrlParseStage::new()),
        Box::new(CacheCheckStage::new(services.repository.clone())),
        Box::new(DownloadStage::new(services.downloader.clone(), temp_root)),
        Box::new(MetadataStage::new(services.repository.clone())),
        Box::new(SceneExtractionStage::new(
            services.scene_extractor.clone(),
            settings.analysis.max_scenes,
        )),
        Box::new(AiAnalysisStage::new(analyzer, services.repository.clone())),
        Box::new(StorageUploadStage::new(
            services.storage.clone(),
            settings.storage.clone(),
        )),
        Box::new(NotionSyncStage::new(
            services.database_sync.clone(),
            settings.notion.auto_upload,
        )),
        Box::new(CleanupStage::new(temp_root, settings.cleanup.enabled)),
    ]
}

/// Create the default pipeline with all stages in the correct order.
pub fn create_default_pipeline(
    services: &PipelineServices,
    settings: &Settings,
    analyzer: Box<dyn VisionAnalyzer>,
) -> Pipeline {
    let pipeline = default_stages(services, settings, analyzer).into_iter().fold(
        Pipeline::new().with_log_config(LogConfig::from(&settings.logging)),
        |pipeline, stage| pipeline.with_boxed_stage(stage),
    );

    if settings.logging.write_run_logs {
        pipeline.with_log_dir(&settings.paths.logs_folder)
    } else {
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AiProvider;
    use crate::orchestrator::testing::{analyzer_factory, fake_services, test_settings};

    #[test]
    fn default_pipeline_order() {
        let dir = tempfile::tempdir().unwrap();
        let (services, _) = fake_services(1);
        let analyzer = (analyzer_factory())(AiProvider::OpenAi, "gpt-4o").unwrap();
        let pipeline = create_default_pipeline(&services, &test_settings(dir.path()), analyzer);

        assert_eq!(
            pipeline.stage_names(),
            vec![
                "url_parse",
                "cache_check",
                "download",
                "metadata",
                "scene_extraction",
                "ai_analysis",
                "storage_upload",
                "notion_sync",
                "cleanup",
            ]
        );
    }
}
