//! Test doubles for pipeline collaborators.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Settings;
use crate::models::{AiProvider, AnalysisResult, Scene, StorageBackend, Video};
use crate::services::{
    AnalyzerError, AnalyzerFactory, DatabaseSync, DownloadError, DownloadResult, NotionError,
    RemoteStorage, SceneError, SceneExtraction, SceneExtractor, VideoDatabase, VideoDownloader,
    VisionAnalyzer,
};

use super::coordinator::PipelineServices;
use super::types::ProgressCallback;

/// Writes a small file in place of the real download.
pub struct FakeDownloader {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VideoDownloader for FakeDownloader {
    fn download(
        &self,
        _url: &str,
        video_id: &str,
        work_dir: &Path,
        output: &dyn Fn(&str, bool),
    ) -> Result<DownloadResult, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            output("ERROR: [youtube] Video unavailable", true);
            return Err(DownloadError::CommandFailed {
                tool: "yt-dlp".to_string(),
                exit_code: 1,
                message: "Video unavailable".to_string(),
            });
        }

        let file_path = work_dir.join(format!("{}.mp4", video_id));
        let io_err = |source| DownloadError::Io {
            path: work_dir.to_path_buf(),
            source,
        };
        fs::write(&file_path, b"video").map_err(io_err)?;
        fs::write(work_dir.join(format!("{}_Thumbnail.jpg", video_id)), b"thumb")
            .map_err(io_err)?;

        Ok(DownloadResult {
            file_path,
            title: "Never Gonna Give You Up".to_string(),
            duration: 212.0,
            uploader: "Rick Astley".to_string(),
            tags: vec!["music".to_string(), "80s".to_string()],
            ext: "mp4".to_string(),
            ..Default::default()
        })
    }
}

/// Writes `count` frames, or returns a fixed extraction.
pub struct FakeSceneExtractor {
    count: usize,
    fixed: Option<SceneExtraction>,
}

impl FakeSceneExtractor {
    pub fn flat(count: usize) -> Self {
        Self { count, fixed: None }
    }

    pub fn returning(extraction: SceneExtraction) -> Self {
        Self {
            count: 0,
            fixed: Some(extraction),
        }
    }
}

impl SceneExtractor for FakeSceneExtractor {
    fn extract_scenes(
        &self,
        _video_path: &Path,
        session_dir: &Path,
        _short_form: bool,
        output: &dyn Fn(&str, bool),
    ) -> Result<SceneExtraction, SceneError> {
        output("[Parsed_showinfo_1] n: 0 pts_time:0.000", true);
        if let Some(ref fixed) = self.fixed {
            return Ok(fixed.clone());
        }

        let scenes_dir = session_dir.join("scenes");
        let io_err = |source| SceneError::Io {
            path: scenes_dir.clone(),
            source,
        };
        fs::create_dir_all(&scenes_dir).map_err(io_err)?;

        let mut scenes = Vec::with_capacity(self.count);
        for i in 0..self.count {
            let frame = scenes_dir.join(format!("scene_{:04}.jpg", i));
            fs::write(&frame, b"jpeg").map_err(io_err)?;
            scenes.push(Scene::new(i as f64 * 2.0, frame).with_confidence(0.5));
        }
        Ok(SceneExtraction::Flat(scenes))
    }
}

/// Returns a canned analysis.
pub struct FakeAnalyzer {
    provider: AiProvider,
    model: String,
    genre: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeAnalyzer {
    pub fn new(genre: &str) -> Self {
        Self {
            provider: AiProvider::Gemini,
            model: "gemini-2.0-flash".to_string(),
            genre: Some(genre.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An analyzer whose model never answers usefully.
    pub fn empty() -> Self {
        Self {
            genre: None,
            ..Self::new("")
        }
    }

    pub fn with_provider(mut self, provider: AiProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl VisionAnalyzer for FakeAnalyzer {
    fn provider(&self) -> AiProvider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn analyze(&self, _video: &Video) -> Result<Option<AnalysisResult>, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.genre.as_ref().map(|genre| AnalysisResult {
            genre: genre.clone(),
            reasoning: "Handheld footage of markets".to_string(),
            features: "Natural light".to_string(),
            tags: vec!["travel".to_string(), "street food".to_string()],
            expression_style: "Live action".to_string(),
            mood_tone: "Upbeat".to_string(),
            target_audience: "Travellers".to_string(),
            model_used: None,
            analyzed_at: None,
        }))
    }
}

/// Factory producing `FakeAnalyzer`s that classify everything as "Travel Vlog".
pub fn analyzer_factory() -> AnalyzerFactory {
    Box::new(|provider: AiProvider, model: &str| {
        let analyzer = FakeAnalyzer::new("Travel Vlog")
            .with_provider(provider)
            .with_model(model);
        Ok::<_, AnalyzerError>(Box::new(analyzer) as Box<dyn VisionAnalyzer>)
    })
}

/// Records every upload attempt.
pub struct RecordingStorage {
    backend: StorageBackend,
    attempts: Mutex<Vec<String>>,
    /// Remote paths ending with this suffix fail.
    reject: Option<String>,
}

impl RecordingStorage {
    pub fn webdav() -> Self {
        Self {
            backend: StorageBackend::WebDav,
            attempts: Mutex::new(Vec::new()),
            reject: None,
        }
    }

    pub fn local() -> Self {
        Self {
            backend: StorageBackend::Local,
            ..Self::webdav()
        }
    }

    pub fn rejecting(mut self, suffix: &str) -> Self {
        self.reject = Some(suffix.to_string());
        self
    }

    pub fn rejecting_all(self) -> Self {
        self.rejecting("")
    }

    pub fn remote_paths(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

impl RemoteStorage for RecordingStorage {
    fn name(&self) -> &str {
        "recording"
    }

    fn backend(&self) -> StorageBackend {
        self.backend
    }

    fn upload_file(&self, _local_path: &Path, remote_path: &str) -> bool {
        self.attempts.lock().push(remote_path.to_string());
        !self
            .reject
            .as_ref()
            .is_some_and(|suffix| remote_path.ends_with(suffix.as_str()))
    }

    fn test_connection(&self) -> bool {
        true
    }
}

/// Database sync that succeeds with a fixed page id or always fails.
pub struct FakeSync {
    page_id: Option<String>,
    calls: AtomicUsize,
}

impl FakeSync {
    pub fn succeeding(page_id: &str) -> Self {
        Self {
            page_id: Some(page_id.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            page_id: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DatabaseSync for FakeSync {
    fn add_video_to_database(
        &self,
        _video: &Video,
        _analysis: &AnalysisResult,
    ) -> Result<String, NotionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.page_id
            .clone()
            .ok_or_else(|| NotionError::InvalidResponse("service unavailable".to_string()))
    }
}

/// Handles to the fakes behind a `PipelineServices`.
pub struct Fakes {
    pub downloader: Arc<FakeDownloader>,
    pub storage: Arc<RecordingStorage>,
    pub sync: Arc<FakeSync>,
    pub repository: Arc<VideoDatabase>,
}

/// In-memory services whose extractor yields `scene_count` frames.
pub fn fake_services(scene_count: usize) -> (PipelineServices, Fakes) {
    let fakes = Fakes {
        downloader: Arc::new(FakeDownloader::new()),
        storage: Arc::new(RecordingStorage::webdav()),
        sync: Arc::new(FakeSync::succeeding("page-1")),
        repository: Arc::new(VideoDatabase::in_memory()),
    };
    let services = PipelineServices {
        repository: fakes.repository.clone(),
        downloader: fakes.downloader.clone(),
        scene_extractor: Arc::new(FakeSceneExtractor::flat(scene_count)),
        storage: fakes.storage.clone(),
        database_sync: Some(fakes.sync.clone()),
    };
    (services, fakes)
}

/// Settings rooted in a temp directory, with cleanup enabled.
pub fn test_settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.temp_root = root.join("temp").to_string_lossy().to_string();
    settings.paths.logs_folder = root.join("logs").to_string_lossy().to_string();
    settings.paths.database_path = root.join("videos.json").to_string_lossy().to_string();
    settings.analysis.provider = AiProvider::Gemini;
    settings.cleanup.enabled = true;
    settings
}

/// Collects progress events.
#[derive(Clone, Default)]
pub struct ProgressLog {
    events: Arc<Mutex<Vec<(String, u32, String)>>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> ProgressCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |stage: &str, percent: u32, message: &str| {
            events
                .lock()
                .push((stage.to_string(), percent, message.to_string()));
        })
    }

    pub fn events(&self) -> Vec<(String, u32, String)> {
        self.events.lock().clone()
    }

    /// Distinct stage names in first-seen order.
    pub fn stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = Vec::new();
        for (stage, _, _) in self.events.lock().iter() {
            if !stages.contains(stage) {
                stages.push(stage.clone());
            }
        }
        stages
    }
}
