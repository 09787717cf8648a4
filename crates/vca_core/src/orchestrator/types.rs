//! Core types for the orchestrator pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, RunLogger};
use crate::models::{AnalysisResult, Platform, Scene, StorageBackend, Video};
use crate::services::DownloadResult;

use super::errors::{StageError, StageResult};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (stage_name, percent_complete, message). A failed run
/// reports `("error", 0, "<stage> failed: <message>")`.
pub type ProgressCallback = Arc<dyn Fn(&str, u32, &str) + Send + Sync>;

/// `stage_results` key set by the cache check on a hit.
pub const CACHE_HIT_KEY: &str = "cache_hit";
/// `stage_results` key for the storage upload summary.
pub const STORAGE_UPLOAD_KEY: &str = "storage_upload";
/// `stage_results` key for the Notion sync summary.
pub const NOTION_SYNC_KEY: &str = "notion_sync";
/// `stage_results` key for the cleanup summary.
pub const CLEANUP_KEY: &str = "cleanup";

/// Lifecycle of a stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Outcome recorded by a stage in `Context::stage_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageRecord {
    /// A stored analysis was restored instead of running the full pipeline.
    CacheHit,
    Upload(UploadSummary),
    Sync(SyncSummary),
    Cleanup(CleanupSummary),
}

/// Result of uploading run artifacts to remote storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub backend: StorageBackend,
    /// Remote folder the files were uploaded under.
    pub remote_dir: String,
    /// Remote paths that were uploaded.
    pub uploaded: Vec<String>,
    /// Local files that failed to upload.
    pub failed: Vec<PathBuf>,
}

impl UploadSummary {
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of syncing to the remote database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub success: bool,
    /// Page id on success, error message on failure.
    pub message: String,
}

/// Result of removing the per-video working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub path: PathBuf,
    pub removed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mutable state for one pipeline run.
///
/// Created at pipeline start, threaded through every stage, and handed
/// back to the caller when the run succeeds. Each stage writes only the
/// fields it owns.
#[derive(Debug)]
pub struct Context {
    /// Input URL, fixed for the run.
    url: String,
    /// Bypass the cache check.
    pub force_reanalyze: bool,
    /// Set by url_parse.
    pub platform: Option<Platform>,
    /// Set by url_parse.
    pub video_id: Option<String>,
    /// The result object.
    pub video: Option<Video>,
    /// Raw downloader output.
    pub download_result: Option<DownloadResult>,
    /// Scenes selected for analysis.
    pub scenes: Vec<Scene>,
    pub analysis_result: Option<AnalysisResult>,
    pub started_at: DateTime<Local>,
    pub stage_results: HashMap<String, StageRecord>,
    /// `[stage] message` for each failed stage.
    pub errors: Vec<String>,
    /// Status of every stage in pipeline order.
    pub stage_statuses: Vec<(String, StageStatus)>,
    /// Per-run logger.
    pub logger: Arc<RunLogger>,
}

impl Context {
    /// Create a context for a run.
    pub fn new(url: impl Into<String>, force_reanalyze: bool, logger: Arc<RunLogger>) -> Self {
        Self {
            url: url.into(),
            force_reanalyze,
            platform: None,
            video_id: None,
            video: None,
            download_result: None,
            scenes: Vec::new(),
            analysis_result: None,
            started_at: Local::now(),
            stage_results: HashMap::new(),
            errors: Vec::new(),
            stage_statuses: Vec::new(),
            logger,
        }
    }

    /// Context with a detached logger, for runs outside a pipeline.
    pub fn detached(url: impl Into<String>, force_reanalyze: bool) -> Self {
        let url = url.into();
        let logger = RunLogger::detached(url.clone(), LogConfig::default(), None);
        Self::new(url, force_reanalyze, Arc::new(logger))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the cache check restored a stored analysis.
    pub fn is_cache_hit(&self) -> bool {
        matches!(
            self.stage_results.get(CACHE_HIT_KEY),
            Some(StageRecord::CacheHit)
        )
    }

    pub fn record(&mut self, key: impl Into<String>, record: StageRecord) {
        self.stage_results.insert(key.into(), record);
    }

    /// Video id set by url_parse.
    pub fn require_video_id(&self) -> StageResult<&str> {
        self.video_id
            .as_deref()
            .ok_or_else(|| StageError::precondition_failed("video id not resolved"))
    }

    pub fn require_platform(&self) -> StageResult<Platform> {
        self.platform
            .ok_or_else(|| StageError::precondition_failed("platform not resolved"))
    }

    pub fn require_video(&self) -> StageResult<&Video> {
        self.video
            .as_ref()
            .ok_or_else(|| StageError::precondition_failed("no video in context"))
    }

    pub fn require_video_mut(&mut self) -> StageResult<&mut Video> {
        self.video
            .as_mut()
            .ok_or_else(|| StageError::precondition_failed("no video in context"))
    }

    /// Status of a stage by name.
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.stage_statuses
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }

    pub(crate) fn set_stage_status(&mut self, name: &str, status: StageStatus) {
        match self.stage_statuses.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = status,
            None => self.stage_statuses.push((name.to_string(), status)),
        }
    }

    /// Names of stages with the given status, in pipeline order.
    pub fn stages_with_status(&self, status: StageStatus) -> Vec<&str> {
        self.stage_statuses
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Consume the context, returning the result object.
    pub fn into_video(self) -> Option<Video> {
        self.video
    }
}
