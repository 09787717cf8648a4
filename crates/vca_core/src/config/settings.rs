//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::models::{AiProvider, StorageBackend};

use super::manager::{ConfigError, ConfigResult};

/// Most frames a single analysis request may carry.
pub const MAX_ANALYSIS_SCENES: usize = 10;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Working, log and database locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// AI analysis settings.
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Remote storage upload settings.
    #[serde(default)]
    pub storage: StorageSettings,

    /// Notion database sync settings.
    #[serde(default)]
    pub notion: NotionSettings,

    /// Temporary file cleanup.
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

impl Settings {
    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        let scenes = self.analysis.max_scenes;
        if !(1..=MAX_ANALYSIS_SCENES).contains(&scenes) {
            return Err(ConfigError::invalid(
                "analysis.max_scenes",
                format!("must be between 1 and {}, got {}", MAX_ANALYSIS_SCENES, scenes),
            ));
        }
        if self.analysis.max_tokens == 0 {
            return Err(ConfigError::invalid("analysis.max_tokens", "must be at least 1"));
        }
        if self.logging.progress_step == 0 {
            return Err(ConfigError::invalid("logging.progress_step", "must be at least 1"));
        }
        if self.storage.backend == StorageBackend::WebDav && self.storage.webdav_url.trim().is_empty() {
            return Err(ConfigError::invalid(
                "storage.webdav_url",
                "required when the backend is webdav",
            ));
        }
        Ok(())
    }
}

/// Path configuration for temp, logs and the video database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder for per-video working directories.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Folder for run log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// JSON file backing the video database.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_temp_root() -> String {
    "data/temp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_database_path() -> String {
    "data/database/videos.json".to_string()
}

impl PathSettings {
    /// Working directory for one video.
    pub fn session_dir(&self, video_id: &str) -> PathBuf {
        PathBuf::from(&self.temp_root).join(video_id)
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            logs_folder: default_logs_folder(),
            database_path: default_database_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level for run logs.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of error lines to show in tail.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Write one log file per pipeline run into the logs folder.
    #[serde(default = "default_true")]
    pub write_run_logs: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            write_run_logs: true,
        }
    }
}

/// AI analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Provider used when the coordinator is created.
    #[serde(default)]
    pub provider: AiProvider,

    /// Model name. Empty means the provider's default model.
    #[serde(default)]
    pub model_name: String,

    /// Upper bound on frames sent to the model when the extractor
    /// returns no grouping.
    #[serde(default = "default_max_scenes")]
    pub max_scenes: usize,

    #[serde(default)]
    pub openai_api_key: String,

    #[serde(default)]
    pub anthropic_api_key: String,

    #[serde(default)]
    pub gemini_api_key: String,

    /// Replaces the provider's API base URL (e.g. a compatible proxy).
    /// Empty means the official endpoint.
    #[serde(default)]
    pub api_base_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// OpenAI image detail: low, high or auto.
    #[serde(default = "default_image_detail")]
    pub image_detail: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_scenes() -> usize {
    10
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_image_detail() -> String {
    "low".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl AnalysisSettings {
    /// Model to use for the given provider.
    ///
    /// A configured model only applies if it belongs to that provider.
    pub fn model_for(&self, provider: AiProvider) -> String {
        if !self.model_name.is_empty() && AiProvider::from_model_name(&self.model_name) == provider
        {
            self.model_name.clone()
        } else {
            provider.default_model().to_string()
        }
    }

    /// API key configured for the provider.
    pub fn api_key_for(&self, provider: AiProvider) -> &str {
        match provider {
            AiProvider::OpenAi => &self.openai_api_key,
            AiProvider::Claude => &self.anthropic_api_key,
            AiProvider::Gemini => &self.gemini_api_key,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            model_name: String::new(),
            max_scenes: default_max_scenes(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            gemini_api_key: String::new(),
            api_base_url: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            image_detail: default_image_detail(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Remote storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Storage backend.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Skip uploading when the backend is local.
    #[serde(default = "default_true")]
    pub skip_local: bool,

    /// Remote folder that per-video folders are created under.
    #[serde(default = "default_remote_base")]
    pub remote_base: String,

    /// Root directory for the local backend.
    #[serde(default = "default_local_root")]
    pub local_root: String,

    /// WebDAV server URL (e.g. `https://nas.local:5006`).
    #[serde(default)]
    pub webdav_url: String,

    #[serde(default)]
    pub webdav_username: String,

    #[serde(default)]
    pub webdav_password: String,
}

fn default_remote_base() -> String {
    "video_analysis".to_string()
}

fn default_local_root() -> String {
    "data/storage".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            skip_local: true,
            remote_base: default_remote_base(),
            local_root: default_local_root(),
            webdav_url: String::new(),
            webdav_username: String::new(),
            webdav_password: String::new(),
        }
    }
}

/// Notion sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionSettings {
    /// Sync every completed analysis.
    #[serde(default = "default_true")]
    pub auto_upload: bool,

    #[serde(default)]
    pub database_id: String,

    #[serde(default)]
    pub api_token: String,

    /// Public base URL thumbnails are served from after upload.
    /// Empty means the platform thumbnail URL is used.
    #[serde(default)]
    pub thumbnail_base_url: String,
}

impl NotionSettings {
    /// Whether enough is configured to build a client.
    pub fn is_configured(&self) -> bool {
        !self.database_id.is_empty() && !self.api_token.is_empty()
    }
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            auto_upload: true,
            database_id: String::new(),
            api_token: String::new(),
            thumbnail_base_url: String::new(),
        }
    }
}

/// Cleanup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Remove the per-video working directory at the end of a run.
    #[serde(default)]
    pub enabled: bool,
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Analysis,
    Storage,
    Notion,
    Cleanup,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Analysis,
        ConfigSection::Storage,
        ConfigSection::Notion,
        ConfigSection::Cleanup,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Analysis => "analysis",
            ConfigSection::Storage => "storage",
            ConfigSection::Notion => "notion",
            ConfigSection::Cleanup => "cleanup",
        }
    }

    /// Comment written above the section.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Working, log and database locations",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Analysis => "AI analysis provider and model",
            ConfigSection::Storage => "Remote storage upload",
            ConfigSection::Notion => "Notion database sync",
            ConfigSection::Cleanup => "Temporary file cleanup",
        }
    }
}
