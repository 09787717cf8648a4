//! HTTP vision analyzers for OpenAI, Claude and Gemini.
//!
//! One client covers all three providers: they differ only in endpoint,
//! authentication, request body and where the answer text sits in the
//! response. The answer is parsed with [`parse_labeled_response`].

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AnalysisSettings;
use crate::models::{AiProvider, AnalysisResult, Video};

use super::analyzer::{parse_labeled_response, AnalyzerError, AnalyzerFactory, VisionAnalyzer};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const CLAUDE_BASE: &str = "https://api.anthropic.com/v1";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Scene frames sent per request (the thumbnail comes on top).
const MAX_SCENE_IMAGES: usize = 10;
const MAX_PROMPT_TAGS: usize = 10;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_MERGED_TAGS: usize = 20;

const SYSTEM_PROMPT: &str = "You are an expert analyst of video and advertising content. \
Analyze the provided images together with the metadata and describe the video's genre, \
features and target audience in detail. The metadata is only a reference: when it \
disagrees with the images, trust the images.";

const GENRES: [&str; 16] = [
    "2D Animation",
    "3D Animation",
    "Motion Graphics",
    "Interview",
    "Spot Ad",
    "VLOG",
    "YouTube Content",
    "Documentary",
    "Brand Film",
    "TVC",
    "Music Video",
    "Educational",
    "Product Introduction",
    "Event Video",
    "Web Drama",
    "Viral Video",
];

const EXPRESSION_STYLES: [&str; 6] = [
    "2D",
    "3D",
    "Live action",
    "Mixed",
    "Stop motion",
    "Typography",
];

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Blocking vision analyzer that talks to a provider's HTTP API.
pub struct HttpVisionAnalyzer {
    provider: AiProvider,
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    image_detail: String,
    client: Client,
}

impl HttpVisionAnalyzer {
    /// Build an analyzer from the analysis settings.
    ///
    /// Fails with `Unavailable` when no API key is configured for the
    /// provider.
    pub fn new(
        provider: AiProvider,
        model: &str,
        settings: &AnalysisSettings,
    ) -> Result<Self, AnalyzerError> {
        if settings.api_key_for(provider).is_empty() {
            return Err(AnalyzerError::Unavailable(format!(
                "{} (no API key configured)",
                provider.name()
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| AnalyzerError::Request {
                provider: provider.name().to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::with_client(provider, model, settings, client))
    }

    fn with_client(
        provider: AiProvider,
        model: &str,
        settings: &AnalysisSettings,
        client: Client,
    ) -> Self {
        let base_url = if settings.api_base_url.trim().is_empty() {
            default_base_url(provider).to_string()
        } else {
            settings.api_base_url.trim().trim_end_matches('/').to_string()
        };
        let image_detail = match settings.image_detail.as_str() {
            "low" | "high" => settings.image_detail.clone(),
            _ => "auto".to_string(),
        };

        Self {
            provider,
            model: model.to_string(),
            api_key: settings.api_key_for(provider).to_string(),
            base_url,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            image_detail,
            client,
        }
    }

    fn endpoint(&self) -> String {
        match self.provider {
            AiProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            AiProvider::Claude => format!("{}/messages", self.base_url),
            AiProvider::Gemini => format!("{}/models/{}:generateContent", self.base_url, self.model),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.provider {
            AiProvider::OpenAi => request.bearer_auth(&self.api_key),
            AiProvider::Claude => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            AiProvider::Gemini => request.header("x-goog-api-key", &self.api_key),
        }
    }

    /// Request body with `images` as base64 JPEG data.
    fn request_body(&self, prompt: &str, images: &[String]) -> Value {
        match self.provider {
            AiProvider::OpenAi => {
                let mut content = vec![json!({ "type": "text", "text": prompt })];
                content.extend(images.iter().map(|data| {
                    json!({
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/jpeg;base64,{}", data),
                            "detail": self.image_detail
                        }
                    })
                }));
                json!({
                    "model": self.model,
                    "messages": [
                        { "role": "system", "content": SYSTEM_PROMPT },
                        { "role": "user", "content": content }
                    ],
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature
                })
            }
            AiProvider::Claude => {
                let mut content = vec![json!({ "type": "text", "text": prompt })];
                content.extend(images.iter().map(|data| {
                    json!({
                        "type": "image",
                        "source": { "type": "base64", "media_type": "image/jpeg", "data": data }
                    })
                }));
                json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "system": SYSTEM_PROMPT,
                    "messages": [{ "role": "user", "content": content }]
                })
            }
            AiProvider::Gemini => {
                let mut parts = vec![json!({ "text": format!("{}\n\n{}", SYSTEM_PROMPT, prompt) })];
                parts.extend(images.iter().map(|data| {
                    json!({ "inlineData": { "mimeType": "image/jpeg", "data": data } })
                }));
                json!({
                    "contents": [{ "role": "user", "parts": parts }],
                    "generationConfig": {
                        "maxOutputTokens": self.max_tokens,
                        "temperature": self.temperature
                    }
                })
            }
        }
    }

    fn request_error(&self, message: impl Into<String>) -> AnalyzerError {
        AnalyzerError::Request {
            provider: self.provider.name().to_string(),
            message: message.into(),
        }
    }

    /// Send the prompt and images, returning the model's answer text.
    fn complete(&self, prompt: &str, images: &[String]) -> Result<String, AnalyzerError> {
        let body = self.request_body(prompt, images);
        tracing::info!(
            "Calling {} ({}) with {} images",
            self.provider.name(),
            self.model,
            images.len()
        );

        let response = self
            .authorize(self.client.post(self.endpoint()))
            .json(&body)
            .send()
            .map_err(|e| self.request_error(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| self.request_error(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(self.request_error(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| AnalyzerError::InvalidResponse(e.to_string()))?;
        extract_text(self.provider, &json).map(str::to_string).ok_or_else(|| {
            AnalyzerError::InvalidResponse(format!("no text in {} response", self.provider.name()))
        })
    }
}

impl VisionAnalyzer for HttpVisionAnalyzer {
    fn provider(&self) -> AiProvider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn analyze(&self, video: &Video) -> Result<Option<AnalysisResult>, AnalyzerError> {
        let paths = collect_images(video);
        let images: Vec<String> = paths
            .iter()
            .filter_map(|path| match fs::read(path) {
                Ok(bytes) => Some(STANDARD.encode(bytes)),
                Err(e) => {
                    tracing::warn!("Skipping image {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        if images.is_empty() {
            tracing::warn!("No images to analyze for {}", video.session_id);
            return Ok(None);
        }

        let prompt = build_prompt(video, images.len());
        let answer = self.complete(&prompt, &images)?;

        let Some(mut result) = parse_labeled_response(&answer) else {
            tracing::warn!(
                "{} answer had no genre ({} chars)",
                self.provider.name(),
                answer.len()
            );
            return Ok(None);
        };

        merge_platform_tags(&mut result, video.tags());
        result.model_used = Some(format!("{}:{}", self.provider.name(), self.model));
        Ok(Some(result))
    }
}

/// Factory that builds an [`HttpVisionAnalyzer`] for each provider.
pub fn default_analyzer_factory(settings: &AnalysisSettings) -> AnalyzerFactory {
    let settings = settings.clone();
    Box::new(move |provider: AiProvider, model: &str| {
        let analyzer = HttpVisionAnalyzer::new(provider, model, &settings)?;
        Ok::<_, AnalyzerError>(Box::new(analyzer) as Box<dyn VisionAnalyzer>)
    })
}

fn default_base_url(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::OpenAi => OPENAI_BASE,
        AiProvider::Claude => CLAUDE_BASE,
        AiProvider::Gemini => GEMINI_BASE,
    }
}

/// Answer text in a provider's response JSON.
fn extract_text(provider: AiProvider, json: &Value) -> Option<&str> {
    match provider {
        AiProvider::OpenAi => json.pointer("/choices/0/message/content")?.as_str(),
        AiProvider::Claude => json
            .get("content")?
            .as_array()?
            .iter()
            .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))?
            .get("text")?
            .as_str(),
        AiProvider::Gemini => json.pointer("/candidates/0/content/parts/0/text")?.as_str(),
    }
}

/// Thumbnail first, then up to ten scene frames (grouped copies preferred).
fn collect_images(video: &Video) -> Vec<PathBuf> {
    let mut images = Vec::new();

    let local_thumbnail = video
        .metadata
        .as_ref()
        .map(|m| PathBuf::from(&m.thumbnail))
        .filter(|p| p.is_file());
    let session_thumbnail = video
        .session_dir
        .as_ref()
        .map(|dir| dir.join(format!("{}_Thumbnail.jpg", video.session_id)))
        .filter(|p| p.is_file());
    if let Some(thumbnail) = local_thumbnail.or(session_thumbnail) {
        images.push(thumbnail);
    }

    for scene in video.scenes.iter().take(MAX_SCENE_IMAGES) {
        match scene.grouped_path.as_ref().filter(|p| p.is_file()) {
            Some(grouped) => images.push(grouped.clone()),
            None if scene.frame_path.is_file() => images.push(scene.frame_path.clone()),
            None => tracing::warn!("Scene image missing: {}", scene.frame_path.display()),
        }
    }
    images
}

/// User prompt: metadata, then the labeled questions A1 to A7.
fn build_prompt(video: &Video, image_count: usize) -> String {
    let mut metadata = Vec::new();
    let mut description = String::new();

    if let Some(meta) = video.metadata.as_ref() {
        if !meta.title.is_empty() {
            metadata.push(format!("Title: {}", meta.title));
        }
        if !meta.uploader.is_empty() {
            metadata.push(format!("Uploader/Channel: {}", meta.uploader));
        }
        if meta.duration > 0.0 {
            let seconds = meta.duration as u64;
            metadata.push(format!("Length: {}m {}s", seconds / 60, seconds % 60));
        }
        if meta.view_count > 0 {
            metadata.push(format!("Views: {}", meta.view_count));
        }
        if !meta.tags.is_empty() {
            let tags: Vec<&str> = meta
                .tags
                .iter()
                .take(MAX_PROMPT_TAGS)
                .map(String::as_str)
                .collect();
            metadata.push(format!("Platform tags: {}", tags.join(", ")));
        }
        if !meta.description.is_empty() {
            let mut text: String = meta.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
            if meta.description.chars().count() > MAX_DESCRIPTION_CHARS {
                text.push_str("...");
            }
            description = format!("\n\nDescription:\n{}", text);
        }
    }

    let items = [
        format!("A1. Genre (pick exactly one): {}", GENRES.join(", ")),
        "A2. Why this genre (at least 200 characters covering visuals, direction, \
         delivery and metadata)"
            .to_string(),
        "A3. Features and notable points (at least 200 characters on color, editing, \
         camera work, atmosphere and message)"
            .to_string(),
        "A4. Ten or more related tags (comma separated, no # symbols, mostly new tags \
         not already on the platform)"
            .to_string(),
        format!(
            "A5. Expression style (pick exactly one): {}",
            EXPRESSION_STYLES.join(", ")
        ),
        "A6. Overall mood and tone".to_string(),
        "A7. Expected target audience".to_string(),
    ];

    format!(
        "Video metadata:\n{}{}\n\n\
         Analyze the {} images extracted from this video. \
         The first image is the thumbnail and the rest are representative scenes.\n\n\
         Use the metadata for context, but when the images disagree with it, trust the images.\n\n\
         Answer all {} items. Write only the content of each answer without repeating \
         its title, and separate the items with a blank line.\n\n\
         Items:\n{}",
        metadata.join("\n"),
        description,
        image_count,
        items.len(),
        items.join("\n")
    )
}

/// Append platform tags the model did not already give, up to 20 in total.
fn merge_platform_tags(result: &mut AnalysisResult, platform_tags: &[String]) {
    for tag in platform_tags {
        let tag = tag.trim();
        if tag.chars().count() > 1 && !result.tags.iter().any(|t| t == tag) {
            result.tags.push(tag.to_string());
        }
    }
    result.tags.truncate(MAX_MERGED_TAGS);
}
