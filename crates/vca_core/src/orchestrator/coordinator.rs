//! Coordinator that owns the collaborators and runs videos through the
//! default pipeline.
//!
//! The pipeline is built lazily for the current AI provider and reused
//! across runs until the provider changes.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::models::{AiProvider, AnalysisRecord, Statistics, Video};
use crate::services::{
    create_storage, default_analyzer_factory, AnalyzerFactory, DatabaseSync, FfmpegSceneExtractor, NotionClient,
    RemoteStorage, RepositoryResult, SceneExtractor, VideoDatabase, VideoDownloader,
    VideoRepository, YtDlpDownloader,
};

use super::create_default_pipeline;
use super::errors::{PipelineError, PipelineResult};
use super::pipeline::Pipeline;
use super::types::{Context, ProgressCallback};

/// Collaborators shared by every pipeline the coordinator builds.
#[derive(Clone)]
pub struct PipelineServices {
    pub repository: Arc<dyn VideoRepository>,
    pub downloader: Arc<dyn VideoDownloader>,
    pub scene_extractor: Arc<dyn SceneExtractor>,
    pub storage: Arc<dyn RemoteStorage>,
    /// `None` when Notion is not configured.
    pub database_sync: Option<Arc<dyn DatabaseSync>>,
}

impl PipelineServices {
    /// Build the production collaborators from settings.
    ///
    /// Storage and Notion clients are created once here and shared.
    pub fn from_settings(settings: &Settings) -> PipelineResult<Self> {
        settings
            .validate()
            .map_err(|e| PipelineError::setup_failed(e.to_string()))?;
        let repository = VideoDatabase::open(&settings.paths.database_path)
            .map_err(|e| PipelineError::setup_failed(e.to_string()))?;
        let storage = create_storage(&settings.storage)
            .map_err(|e| PipelineError::setup_failed(e.to_string()))?;

        let database_sync: Option<Arc<dyn DatabaseSync>> = if settings.notion.is_configured() {
            let client = NotionClient::new(&settings.notion)
                .map_err(|e| PipelineError::setup_failed(e.to_string()))?;
            Some(Arc::new(client))
        } else {
            tracing::info!("Notion is not configured, sync disabled");
            None
        };

        Ok(Self {
            repository: Arc::new(repository),
            downloader: Arc::new(YtDlpDownloader::new()),
            scene_extractor: Arc::new(
                FfmpegSceneExtractor::new().with_target_scenes(settings.analysis.max_scenes),
            ),
            storage: Arc::from(storage),
            database_sync,
        })
    }
}

/// Entry point for processing videos.
///
/// # Example
///
/// ```ignore
/// let mut coordinator = Coordinator::standard(settings)?;
/// let video = coordinator.process(url, false, None)?;
/// println!("{:?}", video.genre());
/// ```
pub struct Coordinator {
    settings: Settings,
    services: PipelineServices,
    analyzer_factory: AnalyzerFactory,
    provider: AiProvider,
    /// Built on first use for `provider`.
    pipeline: Option<Pipeline>,
}

impl Coordinator {
    /// Create a coordinator with explicit collaborators.
    pub fn new(
        settings: Settings,
        services: PipelineServices,
        analyzer_factory: AnalyzerFactory,
    ) -> Self {
        let provider = settings.analysis.provider;
        Self {
            settings,
            services,
            analyzer_factory,
            provider,
            pipeline: None,
        }
    }

    /// Create a coordinator with the production collaborators.
    pub fn from_settings(
        settings: Settings,
        analyzer_factory: AnalyzerFactory,
    ) -> PipelineResult<Self> {
        let services = PipelineServices::from_settings(&settings)?;
        Ok(Self::new(settings, services, analyzer_factory))
    }

    /// Production collaborators and the HTTP analyzers for every provider.
    pub fn standard(settings: Settings) -> PipelineResult<Self> {
        let factory = default_analyzer_factory(&settings.analysis);
        Self::from_settings(settings, factory)
    }

    pub fn provider(&self) -> AiProvider {
        self.provider
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Id of the cached pipeline, if one has been built.
    pub fn pipeline_id(&self) -> Option<u64> {
        self.pipeline.as_ref().map(Pipeline::id)
    }

    /// Use a different AI provider from the next run on.
    ///
    /// Drops the cached pipeline.
    pub fn switch_provider(&mut self, name: &str) -> PipelineResult<()> {
        let provider = AiProvider::from_name(name)
            .ok_or_else(|| PipelineError::setup_failed(format!("Unknown AI provider: {}", name)))?;
        tracing::info!("Switching AI provider {} -> {}", self.provider, provider);
        self.provider = provider;
        self.pipeline = None;
        Ok(())
    }

    /// Process a URL and return the result object.
    ///
    /// Errors from the pipeline are logged and returned unchanged.
    pub fn process(
        &mut self,
        url: &str,
        force_reanalyze: bool,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<Video> {
        let ctx = self.process_with_context(url, force_reanalyze, progress)?;
        ctx.into_video()
            .ok_or_else(|| PipelineError::missing_result("video"))
    }

    /// Process a URL and return the whole run context.
    pub fn process_with_context(
        &mut self,
        url: &str,
        force_reanalyze: bool,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<Context> {
        tracing::info!("Processing {} (provider {})", url, self.provider);
        let pipeline = self.pipeline()?;
        match pipeline.execute(url, force_reanalyze, progress) {
            Ok(ctx) => {
                tracing::info!(
                    "Processed {} ({})",
                    url,
                    if ctx.is_cache_hit() { "cached" } else { "analyzed" }
                );
                Ok(ctx)
            }
            Err(e) => {
                tracing::error!("Processing {} failed: {}", url, e);
                Err(e)
            }
        }
    }

    /// Stored analyses of a video, oldest first.
    pub fn get_analysis_history(&self, video_id: &str) -> RepositoryResult<Vec<AnalysisRecord>> {
        self.services.repository.get_all_analyses(video_id)
    }

    pub fn search_by_genre(&self, genre: &str) -> RepositoryResult<Vec<AnalysisRecord>> {
        self.services.repository.search_by_genre(genre)
    }

    pub fn search_by_tags(&self, tags: &[String]) -> RepositoryResult<Vec<AnalysisRecord>> {
        self.services.repository.search_by_tags(tags)
    }

    pub fn get_statistics(&self) -> RepositoryResult<Statistics> {
        self.services.repository.get_statistics()
    }

    /// Working directory used for a video.
    pub fn session_dir(&self, video_id: &str) -> PathBuf {
        self.settings.paths.session_dir(video_id)
    }

    fn pipeline(&mut self) -> PipelineResult<&mut Pipeline> {
        if self.pipeline.is_none() {
            self.settings
                .validate()
                .map_err(|e| PipelineError::setup_failed(e.to_string()))?;
            let model = self.settings.analysis.model_for(self.provider);
            let analyzer = (self.analyzer_factory)(self.provider, &model)
                .map_err(|e| PipelineError::setup_failed(e.to_string()))?;
            let pipeline = create_default_pipeline(&self.services, &self.settings, analyzer);
            tracing::debug!(
                "Built pipeline {} for {} ({})",
                pipeline.id(),
                self.provider,
                model
            );
            self.pipeline = Some(pipeline);
        }
        self.pipeline
            .as_mut()
            .ok_or_else(|| PipelineError::setup_failed("pipeline not built"))
    }
}
