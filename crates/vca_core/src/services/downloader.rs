//! Video download using yt-dlp.
//!
//! yt-dlp prints the resolved info JSON (`--dump-json --no-simulate`) and
//! writes the video, thumbnail and subtitles into the per-video working
//! directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Platform, VideoMetadata};

use super::forward_output;

/// Errors from downloading a video.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("Failed to parse download info: {0}")]
    InvalidInfo(String),

    #[error("Downloaded file not found in {0}")]
    MissingFile(PathBuf),

    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Network error: {0}")]
    Network(String),
}

/// What the downloader reports about a finished download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub file_path: PathBuf,
    pub title: String,
    pub duration: f64,
    pub uploader: String,
    pub channel_id: String,
    pub description: String,
    pub upload_date: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub language: String,
    pub age_limit: u32,
    pub ext: String,
    pub thumbnail: String,
    pub webpage_url: String,
    /// Subtitle language -> file path.
    pub subtitle_files: HashMap<String, PathBuf>,
}

impl DownloadResult {
    /// Build metadata for the result object.
    pub fn to_metadata(&self, video_id: &str, url: &str, platform: Platform) -> VideoMetadata {
        let mut meta = VideoMetadata::new(video_id, &self.title, url, platform)
            .with_duration(self.duration);
        if !self.uploader.is_empty() {
            meta.uploader = self.uploader.clone();
        }
        meta.channel_id = self.channel_id.clone();
        meta.description = self.description.clone();
        meta.upload_date = self.upload_date.clone();
        meta.view_count = self.view_count;
        meta.like_count = self.like_count;
        meta.comment_count = self.comment_count;
        meta.tags = self.tags.clone();
        meta.categories = self.categories.clone();
        meta.language = self.language.clone();
        meta.age_limit = self.age_limit;
        if !self.ext.is_empty() {
            meta.ext = self.ext.clone();
        }
        meta.thumbnail = self.thumbnail.clone();
        if !self.webpage_url.is_empty() {
            meta.webpage_url = self.webpage_url.clone();
        }
        meta.subtitle_files = self.subtitle_files.clone();
        meta
    }
}

/// Fetches a video and its metadata into a working directory.
///
/// Tool output lines go to `output` (the flag marks stderr).
pub trait VideoDownloader: Send + Sync {
    fn download(
        &self,
        url: &str,
        video_id: &str,
        work_dir: &Path,
        output: &dyn Fn(&str, bool),
    ) -> Result<DownloadResult, DownloadError>;
}

/// Downloader backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    binary: String,
    format: String,
    subtitle_langs: String,
}

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            format: "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/b".to_string(),
            subtitle_langs: "ko,en".to_string(),
        }
    }

    /// Use a specific yt-dlp executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn build_args(&self, url: &str, video_id: &str, work_dir: &Path) -> Vec<String> {
        let output = work_dir.join(format!("{}.%(ext)s", video_id));
        let thumbnail = work_dir.join(format!("{}_Thumbnail.%(ext)s", video_id));
        vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--dump-json".to_string(),
            "--no-simulate".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--write-thumbnail".to_string(),
            "--convert-thumbnails".to_string(),
            "jpg".to_string(),
            "--write-subs".to_string(),
            "--sub-langs".to_string(),
            self.subtitle_langs.clone(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            "-o".to_string(),
            format!("thumbnail:{}", thumbnail.to_string_lossy()),
            url.to_string(),
        ]
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDownloader for YtDlpDownloader {
    fn download(
        &self,
        url: &str,
        video_id: &str,
        work_dir: &Path,
        output: &dyn Fn(&str, bool),
    ) -> Result<DownloadResult, DownloadError> {
        fs::create_dir_all(work_dir).map_err(|source| DownloadError::Io {
            path: work_dir.to_path_buf(),
            source,
        })?;

        let args = self.build_args(url, video_id, work_dir);
        tracing::debug!("{} {}", self.binary, args.join(" "));

        let finished = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|source| DownloadError::Spawn {
                tool: self.binary.clone(),
                source,
            })?;

        // The info JSON is parsed below, not logged
        let stdout = String::from_utf8_lossy(&finished.stdout);
        for line in stdout.lines() {
            if !line.trim().is_empty() && !line.trim_start().starts_with('{') {
                output(line, false);
            }
        }
        forward_output(&finished.stderr, true, output);

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            let message = stderr
                .lines()
                .filter(|l| l.contains("ERROR"))
                .last()
                .unwrap_or_else(|| stderr.trim())
                .to_string();
            if is_network_error(&message) {
                return Err(DownloadError::Network(message));
            }
            return Err(DownloadError::CommandFailed {
                tool: self.binary.clone(),
                exit_code: finished.status.code().unwrap_or(-1),
                message,
            });
        }

        // yt-dlp prints one JSON object per line; the video is the last one
        let line = stdout
            .lines()
            .rev()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| DownloadError::InvalidInfo("no JSON in yt-dlp output".to_string()))?;
        let json: Value =
            serde_json::from_str(line).map_err(|e| DownloadError::InvalidInfo(e.to_string()))?;

        let mut result = parse_info_json(&json);

        let reported = (!result.file_path.as_os_str().is_empty()).then(|| result.file_path.clone());
        result.file_path = locate_download(work_dir, video_id, reported.as_deref())
            .ok_or_else(|| DownloadError::MissingFile(work_dir.to_path_buf()))?;
        result.subtitle_files = collect_subtitles(work_dir, video_id);

        tracing::info!(
            "Downloaded '{}' to {}",
            result.title,
            result.file_path.display()
        );
        Ok(result)
    }
}

fn is_network_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["unable to download", "timed out", "connection", "network", "http error 5"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Parse the info JSON printed by yt-dlp.
fn parse_info_json(json: &Value) -> DownloadResult {
    let str_field = |key: &str| -> String {
        json.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let u64_field = |key: &str| -> u64 { json.get(key).and_then(Value::as_u64).unwrap_or(0) };
    let list_field = |key: &str| -> Vec<String> {
        json.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let file_path = json
        .get("requested_downloads")
        .and_then(Value::as_array)
        .and_then(|d| d.first())
        .and_then(|d| d.get("filepath"))
        .or_else(|| json.get("_filename"))
        .or_else(|| json.get("filename"))
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_default();

    let uploader = json
        .get("uploader")
        .or_else(|| json.get("channel"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    DownloadResult {
        file_path,
        title: str_field("title"),
        duration: json.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
        uploader,
        channel_id: str_field("channel_id"),
        description: str_field("description"),
        upload_date: str_field("upload_date"),
        view_count: u64_field("view_count"),
        like_count: u64_field("like_count"),
        comment_count: u64_field("comment_count"),
        tags: list_field("tags"),
        categories: list_field("categories"),
        language: str_field("language"),
        age_limit: u64_field("age_limit") as u32,
        ext: str_field("ext"),
        thumbnail: str_field("thumbnail"),
        webpage_url: str_field("webpage_url"),
        subtitle_files: HashMap::new(),
    }
}

/// Find the downloaded file, preferring the path yt-dlp reported.
fn locate_download(work_dir: &Path, video_id: &str, reported: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = reported {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    ["mp4", "webm", "mkv", "mov"]
        .iter()
        .map(|ext| work_dir.join(format!("{}.{}", video_id, ext)))
        .find(|p| p.is_file())
}

/// Subtitle files named `<id>.<lang>.<vtt|srt>` in the working directory.
fn collect_subtitles(work_dir: &Path, video_id: &str) -> HashMap<String, PathBuf> {
    let mut subtitles = HashMap::new();
    let Ok(entries) = fs::read_dir(work_dir) else {
        return subtitles;
    };

    let prefix = format!("{}.", video_id);
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        if let Some((lang, ext)) = rest.rsplit_once('.') {
            if matches!(ext, "vtt" | "srt") && !lang.is_empty() {
                subtitles.insert(lang.to_string(), path.clone());
            }
        }
    }
    subtitles
}
