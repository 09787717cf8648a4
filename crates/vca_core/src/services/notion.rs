//! Notion database sync.
//!
//! Each analyzed video becomes one page in a Notion database, keyed by the
//! "Video ID" property. Syncing again updates the existing page.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::NotionSettings;
use crate::models::{AnalysisResult, Video};

const API_BASE: &str = "https://api.notion.com/v1";
const API_VERSION: &str = "2022-06-28";

const MAX_TAGS: usize = 30;
const MAX_CATEGORIES: usize = 10;
const MAX_NAME_CHARS: usize = 100;
const MAX_LONG_TEXT_CHARS: usize = 2000;
const MAX_SHORT_TEXT_CHARS: usize = 500;

/// Errors from the Notion API.
#[derive(Error, Debug)]
pub enum NotionError {
    #[error("Notion is not configured (database_id and api_token are required)")]
    NotConfigured,

    #[error("Video has no metadata to sync")]
    MissingMetadata,

    #[error("Notion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notion API error {status} ({code}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Unexpected Notion response: {0}")]
    InvalidResponse(String),
}

/// A remote database that analyzed videos are mirrored into.
pub trait DatabaseSync: Send + Sync {
    /// Create or update the video's record. Returns the page id.
    fn add_video_to_database(
        &self,
        video: &Video,
        analysis: &AnalysisResult,
    ) -> Result<String, NotionError>;
}

/// Blocking Notion API client.
pub struct NotionClient {
    client: Client,
    database_id: String,
    api_token: String,
    thumbnail_base_url: String,
}

impl NotionClient {
    pub fn new(settings: &NotionSettings) -> Result<Self, NotionError> {
        if !settings.is_configured() {
            return Err(NotionError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            database_id: settings.database_id.clone(),
            api_token: settings.api_token.clone(),
            thumbnail_base_url: settings.thumbnail_base_url.clone(),
        })
    }

    /// Check that the database is reachable with the configured token.
    pub fn test_connection(&self) -> bool {
        let url = format!("{}/databases/{}", API_BASE, self.database_id);
        match self.send(self.client.get(url)) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Notion connection test failed: {}", e);
                false
            }
        }
    }

    /// Page id of the existing record for a video, if any.
    pub fn find_page(&self, video_id: &str) -> Result<Option<String>, NotionError> {
        let url = format!("{}/databases/{}/query", API_BASE, self.database_id);
        let body = json!({
            "filter": {
                "property": "Video ID",
                "rich_text": { "equals": video_id }
            },
            "page_size": 1
        });
        let response = self.send(self.client.post(url).json(&body))?;
        Ok(response
            .get("results")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .and_then(|page| page.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn create_page(&self, properties: Value) -> Result<String, NotionError> {
        let url = format!("{}/pages", API_BASE);
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties
        });
        let response = self.send(self.client.post(url).json(&body))?;
        response
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| NotionError::InvalidResponse("created page has no id".to_string()))
    }

    fn update_page(&self, page_id: &str, properties: Value) -> Result<(), NotionError> {
        let url = format!("{}/pages/{}", API_BASE, page_id);
        self.send(
            self.client
                .patch(url)
                .json(&json!({ "properties": properties })),
        )?;
        Ok(())
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value, NotionError> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Notion-Version", API_VERSION)
            .send()?;

        let status = response.status();
        let body: Value = response.json().unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(body);
        }

        let field = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Err(NotionError::Api {
            status,
            code: field("code"),
            message: field("message"),
        })
    }
}

impl DatabaseSync for NotionClient {
    fn add_video_to_database(
        &self,
        video: &Video,
        analysis: &AnalysisResult,
    ) -> Result<String, NotionError> {
        let metadata = video.metadata.as_ref().ok_or(NotionError::MissingMetadata)?;
        let properties = build_properties(video, Some(analysis), &self.thumbnail_base_url)?;

        match self.find_page(&metadata.video_id)? {
            Some(page_id) => {
                self.update_page(&page_id, properties)?;
                tracing::info!("Updated Notion page {} for {}", page_id, metadata.video_id);
                Ok(page_id)
            }
            None => {
                let page_id = self.create_page(properties)?;
                tracing::info!("Created Notion page {} for {}", page_id, metadata.video_id);
                Ok(page_id)
            }
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn rich_text(value: &str, max: usize) -> Value {
    json!({ "rich_text": [{ "text": { "content": truncate_chars(value, max) } }] })
}

fn multi_select<'a>(names: impl Iterator<Item = &'a String>) -> Value {
    let options: Vec<Value> = names
        .map(|n| json!({ "name": truncate_chars(n, MAX_NAME_CHARS) }))
        .collect();
    json!({ "multi_select": options })
}

/// Platform tags followed by analysis tags, de-duplicated and capped.
fn merged_tags(platform_tags: &[String], analysis: Option<&AnalysisResult>) -> Vec<String> {
    let ai_tags = analysis.map(|a| a.tags.as_slice()).unwrap_or_default();
    let mut tags: Vec<String> = Vec::new();
    for tag in platform_tags.iter().chain(ai_tags) {
        // Notion rejects commas in select option names
        let tag = tag.trim().replace(',', " ");
        if tag.chars().count() > 1 && !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

/// Build the page properties for a video.
pub fn build_properties(
    video: &Video,
    analysis: Option<&AnalysisResult>,
    thumbnail_base_url: &str,
) -> Result<Value, NotionError> {
    let meta = video.metadata.as_ref().ok_or(NotionError::MissingMetadata)?;
    let mut props = Map::new();

    let title = if meta.title.is_empty() { "Unknown" } else { meta.title.as_str() };
    props.insert(
        "Title".to_string(),
        json!({ "title": [{ "text": { "content": truncate_chars(title, MAX_NAME_CHARS) } }] }),
    );
    props.insert("Video ID".to_string(), rich_text(&meta.video_id, MAX_NAME_CHARS));
    props.insert("URL".to_string(), json!({ "url": meta.url }));
    props.insert(
        "Platform".to_string(),
        json!({ "select": { "name": meta.platform.display_name() } }),
    );
    props.insert("Uploader".to_string(), rich_text(&meta.uploader, MAX_NAME_CHARS));
    props.insert(
        "Duration".to_string(),
        json!({ "number": meta.duration.round() as i64 }),
    );

    let thumbnail = if thumbnail_base_url.is_empty() {
        meta.thumbnail.clone()
    } else {
        format!(
            "{}/{}/{}_Thumbnail.jpg",
            thumbnail_base_url.trim_end_matches('/'),
            meta.video_id,
            meta.video_id
        )
    };
    if !thumbnail.is_empty() {
        props.insert(
            "Thumbnail".to_string(),
            json!({ "files": [{
                "type": "external",
                "name": format!("{}_thumbnail.jpg", meta.video_id),
                "external": { "url": thumbnail }
            }] }),
        );
    }

    let tags = merged_tags(&meta.tags, analysis);
    if !tags.is_empty() {
        props.insert("Tags".to_string(), multi_select(tags.iter()));
    }

    if !meta.description.is_empty() {
        props.insert(
            "Description".to_string(),
            rich_text(&meta.description, MAX_LONG_TEXT_CHARS),
        );
    }
    if !meta.language.is_empty() {
        props.insert("Language".to_string(), rich_text(&meta.language, 50));
    }
    let categories: Vec<&String> = meta
        .categories
        .iter()
        .filter(|c| !c.is_empty())
        .take(MAX_CATEGORIES)
        .collect();
    if !categories.is_empty() {
        props.insert(
            "Categories".to_string(),
            multi_select(categories.into_iter()),
        );
    }

    match analysis {
        Some(a) => {
            let or_unknown = |s: &str| {
                if s.is_empty() {
                    "Unknown".to_string()
                } else {
                    truncate_chars(&s.replace(',', " "), MAX_NAME_CHARS)
                }
            };
            props.insert("AI Analyzed".to_string(), json!({ "checkbox": true }));
            props.insert(
                "Genre".to_string(),
                json!({ "select": { "name": or_unknown(&a.genre) } }),
            );
            props.insert(
                "Expression Style".to_string(),
                json!({ "select": { "name": or_unknown(&a.expression_style) } }),
            );
            props.insert("Mood".to_string(), rich_text(&a.mood_tone, MAX_SHORT_TEXT_CHARS));
            props.insert(
                "Target Audience".to_string(),
                rich_text(&a.target_audience, MAX_SHORT_TEXT_CHARS),
            );
            props.insert(
                "Reasoning".to_string(),
                rich_text(&a.reasoning, MAX_LONG_TEXT_CHARS),
            );
            props.insert(
                "Features".to_string(),
                rich_text(&a.features, MAX_LONG_TEXT_CHARS),
            );
        }
        None => {
            props.insert("AI Analyzed".to_string(), json!({ "checkbox": false }));
        }
    }

    Ok(Value::Object(props))
}
