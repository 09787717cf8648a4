//! Video, metadata and scene structures.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::analysis::AnalysisResult;
use super::enums::{Platform, SceneType};

/// Videos at or below this duration are treated as short-form.
pub const SHORT_FORM_MAX_SECONDS: f64 = 60.0;

/// Metadata resolved by the downloader (or restored from the repository).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub url: String,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
    /// Channel name.
    #[serde(default = "default_uploader")]
    pub uploader: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub upload_date: String,
    pub platform: Platform,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub language: String,
    /// Subtitle language -> file path.
    #[serde(default)]
    pub subtitle_files: HashMap<String, PathBuf>,
    #[serde(default)]
    pub age_limit: u32,
    #[serde(default = "default_ext")]
    pub ext: String,
    /// Thumbnail URL.
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub webpage_url: String,
}

fn default_uploader() -> String {
    "Unknown".to_string()
}

fn default_ext() -> String {
    "mp4".to_string()
}

impl VideoMetadata {
    /// Create metadata with the required identity fields.
    pub fn new(
        video_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        platform: Platform,
    ) -> Self {
        let url = url.into();
        Self {
            video_id: video_id.into(),
            title: title.into(),
            webpage_url: url.clone(),
            url,
            duration: 0.0,
            uploader: default_uploader(),
            channel_id: String::new(),
            description: String::new(),
            upload_date: String::new(),
            platform,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            tags: Vec::new(),
            categories: Vec::new(),
            language: String::new(),
            subtitle_files: HashMap::new(),
            age_limit: 0,
            ext: default_ext(),
            thumbnail: String::new(),
        }
    }

    /// Set the duration in seconds.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    /// Whether this is a Shorts-style clip.
    ///
    /// Scene extraction uses a denser sampling for short-form content.
    pub fn is_short_form(&self) -> bool {
        (self.duration > 0.0 && self.duration <= SHORT_FORM_MAX_SECONDS)
            || self.url.contains("/shorts/")
            || self.webpage_url.contains("/shorts/")
    }
}

/// A single representative frame extracted from the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Position in seconds.
    pub timestamp: f64,
    /// Path to the extracted frame image.
    pub frame_path: PathBuf,
    #[serde(default)]
    pub scene_type: SceneType,
    /// Scene-change confidence (0.0 - 1.0).
    #[serde(default)]
    pub confidence: f64,
    /// Path of the grouped/representative copy, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_path: Option<PathBuf>,
}

impl Scene {
    pub fn new(timestamp: f64, frame_path: impl Into<PathBuf>) -> Self {
        Self {
            timestamp,
            frame_path: frame_path.into(),
            scene_type: SceneType::Mid,
            confidence: 0.0,
            grouped_path: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// File name of the frame, used when recording which scenes were analyzed.
    pub fn frame_file_name(&self) -> String {
        self.frame_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// The result object a pipeline run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    /// Session identifier (same as the platform video id).
    pub session_id: String,
    pub url: String,
    /// Downloaded file. `None` when restored from cache.
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// Working directory holding the download and extracted frames.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
    #[serde(default)]
    pub metadata: Option<VideoMetadata>,
    /// Scenes selected for analysis.
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// Grouped representative scenes, when the extractor provides them.
    #[serde(default)]
    pub grouped_scenes: Vec<Scene>,
    #[serde(default)]
    pub analysis_result: Option<AnalysisResult>,
    pub created_at: DateTime<Local>,
}

impl Video {
    pub fn new(session_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            url: url.into(),
            local_path: None,
            session_dir: None,
            metadata: None,
            scenes: Vec::new(),
            grouped_scenes: Vec::new(),
            analysis_result: None,
            created_at: Local::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: VideoMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn grouped_scene_count(&self) -> usize {
        self.grouped_scenes.len()
    }

    /// Duration formatted as `MM:SS`.
    pub fn duration_str(&self) -> String {
        match self.metadata.as_ref().map(|m| m.duration) {
            Some(d) if d > 0.0 => {
                let total = d as u64;
                format!("{:02}:{:02}", total / 60, total % 60)
            }
            _ => "00:00".to_string(),
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.analysis_result.is_some()
    }

    pub fn is_short_form(&self) -> bool {
        self.metadata
            .as_ref()
            .map(VideoMetadata::is_short_form)
            .unwrap_or(false)
    }

    /// Tags from the analysis, falling back to platform tags.
    pub fn tags(&self) -> &[String] {
        if let Some(analysis) = &self.analysis_result {
            if !analysis.tags.is_empty() {
                return &analysis.tags;
            }
        }
        self.metadata
            .as_ref()
            .map(|m| m.tags.as_slice())
            .unwrap_or(&[])
    }

    /// Genre from the analysis, if analyzed.
    pub fn genre(&self) -> Option<&str> {
        self.analysis_result.as_ref().map(|a| a.genre.as_str())
    }
}
