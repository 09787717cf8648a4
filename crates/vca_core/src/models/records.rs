//! Repository records and aggregate statistics.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::enums::Platform;
use super::video::{Video, VideoMetadata};

/// Stored video information, written by the metadata stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub duration: f64,
    pub platform: Platform,
    pub download_date: DateTime<Local>,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub description: String,
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
    #[serde(default)]
    pub upload_date: String,
    #[serde(default)]
    pub age_limit: u32,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub webpage_url: String,
}

impl VideoRecord {
    /// Snapshot the metadata of a downloaded video.
    pub fn from_metadata(url: impl Into<String>, meta: &VideoMetadata) -> Self {
        Self {
            video_id: meta.video_id.clone(),
            url: url.into(),
            title: meta.title.clone(),
            duration: meta.duration,
            platform: meta.platform,
            download_date: Local::now(),
            uploader: meta.uploader.clone(),
            channel_id: meta.channel_id.clone(),
            description: meta.description.clone(),
            view_count: meta.view_count,
            like_count: meta.like_count,
            comment_count: meta.comment_count,
            tags: meta.tags.clone(),
            categories: meta.categories.clone(),
            language: meta.language.clone(),
            upload_date: meta.upload_date.clone(),
            age_limit: meta.age_limit,
            thumbnail: meta.thumbnail.clone(),
            webpage_url: meta.webpage_url.clone(),
        }
    }

    /// Rebuild metadata for a cache hit.
    pub fn to_metadata(&self) -> VideoMetadata {
        let mut meta = VideoMetadata::new(&self.video_id, &self.title, &self.url, self.platform)
            .with_duration(self.duration);
        meta.uploader = self.uploader.clone();
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
        meta.thumbnail = self.thumbnail.clone();
        if !self.webpage_url.is_empty() {
            meta.webpage_url = self.webpage_url.clone();
        }
        meta
    }

    /// Rebuild a result object without local artifacts.
    pub fn to_video(&self) -> Video {
        Video::new(&self.video_id, &self.url).with_metadata(self.to_metadata())
    }
}

/// A count keyed by a label (genre, platform, tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Aggregate repository statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_videos: usize,
    pub total_analyses: usize,
    /// Latest genre per video, most common first.
    pub genres: Vec<LabelCount>,
    pub platforms: Vec<LabelCount>,
    /// Top ten analysis tags.
    pub popular_tags: Vec<LabelCount>,
}
