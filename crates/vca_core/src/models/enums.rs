//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// Video hosting platform a URL resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Vimeo,
}

impl Platform {
    /// Lowercase tag used in records and remote paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Vimeo => "vimeo",
        }
    }

    /// Human-facing platform name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Vimeo => "Vimeo",
        }
    }

    /// Parse a stored platform tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "youtube" => Some(Platform::Youtube),
            "vimeo" => Some(Platform::Vimeo),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// AI backend used for scene analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Claude,
    Gemini,
}

impl AiProvider {
    /// Parse a provider name as used in settings and `switch_provider`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" => Some(AiProvider::OpenAi),
            "claude" | "anthropic" => Some(AiProvider::Claude),
            "gemini" | "google" => Some(AiProvider::Gemini),
            _ => None,
        }
    }

    /// Infer the provider from a model name (e.g. "gemini-2.0-flash").
    ///
    /// Anything that is not recognisably Claude or Gemini is routed to OpenAI.
    pub fn from_model_name(model: &str) -> Self {
        let model = model.to_ascii_lowercase();
        if model.contains("claude") {
            AiProvider::Claude
        } else if model.contains("gemini") {
            AiProvider::Gemini
        } else {
            AiProvider::OpenAi
        }
    }

    /// Settings name of the provider.
    pub fn name(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "openai",
            AiProvider::Claude => "claude",
            AiProvider::Gemini => "gemini",
        }
    }

    /// Model used when settings do not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "gpt-4o",
            AiProvider::Claude => "claude-sonnet-4-20250514",
            AiProvider::Gemini => "gemini-2.0-flash",
        }
    }

    /// Display name for a model, falling back to the raw model string.
    pub fn model_display_name(model: &str) -> &str {
        match model {
            "gemini-2.0-flash" => "Google Gemini",
            "gpt-4o" => "GPT-4o",
            "claude-sonnet-4-20250514" => "Claude Sonnet 4",
            other => other,
        }
    }
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Remote storage backend selected once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Copy files under a local root directory.
    #[default]
    Local,
    /// Upload over WebDAV (e.g. a Synology NAS).
    WebDav,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::WebDav => write!(f, "webdav"),
        }
    }
}

/// Position of an extracted frame within its scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneType {
    Start,
    #[default]
    Mid,
    End,
}
