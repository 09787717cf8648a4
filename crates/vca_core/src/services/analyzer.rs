//! Vision analyzer interface and response parsing.
//!
//! Provider clients (see `providers`) hand the raw model text to
//! [`parse_labeled_response`].

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::models::{AiProvider, AnalysisResult, Video};

/// Errors from a vision analyzer.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("Could not parse model response: {0}")]
    InvalidResponse(String),

    #[error("Analyzer not available for provider {0}")]
    Unavailable(String),
}

/// Classifies a video from its extracted scenes and metadata.
pub trait VisionAnalyzer: Send + Sync {
    fn provider(&self) -> AiProvider;

    /// Model identifier (e.g. `gemini-2.0-flash`).
    fn model(&self) -> &str;

    /// Analyze the video's scenes.
    ///
    /// `Ok(None)` means the model produced nothing usable; the run continues.
    fn analyze(&self, video: &Video) -> Result<Option<AnalysisResult>, AnalyzerError>;
}

/// Builds an analyzer for a provider and model name.
pub type AnalyzerFactory =
    Box<dyn Fn(AiProvider, &str) -> Result<Box<dyn VisionAnalyzer>, AnalyzerError> + Send + Sync>;

fn label_regex() -> Option<&'static Regex> {
    static LABEL: OnceLock<Option<Regex>> = OnceLock::new();
    LABEL
        .get_or_init(|| Regex::new(r"^[\s*#]*A([1-7])[.)\s]*[:：]?\s*(.*)$").ok())
        .as_ref()
}

fn strip_markup(value: &str) -> &str {
    value.trim_matches(|c: char| c == '*' || c.is_whitespace())
}

/// Parse a response that answers the labeled questions `A1` to `A7`.
///
/// A1 genre, A2 reasoning, A3 features, A4 tags, A5 expression style,
/// A6 mood/tone, A7 target audience. Answers may span several lines.
/// Returns `None` when no genre was found.
pub fn parse_labeled_response(text: &str) -> Option<AnalysisResult> {
    let re = label_regex()?;
    let mut fields: [String; 7] = Default::default();
    let mut current: Option<usize> = None;

    for line in text.lines() {
        if let Some(caps) = re.captures(line) {
            let index = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .map(|n| n - 1);
            if let Some(i) = index {
                fields[i] = caps
                    .get(2)
                    .map(|m| strip_markup(m.as_str()).to_string())
                    .unwrap_or_default();
                current = Some(i);
                continue;
            }
        }
        if let Some(i) = current {
            let line = line.trim();
            if !line.is_empty() {
                if !fields[i].is_empty() {
                    fields[i].push(' ');
                }
                fields[i].push_str(line);
            }
        }
    }

    let [genre, reasoning, features, tags, expression_style, mood_tone, target_audience] = fields;
    if genre.is_empty() {
        return None;
    }

    Some(AnalysisResult {
        genre,
        reasoning,
        features,
        tags: split_tags(&tags),
        expression_style,
        mood_tone,
        target_audience,
        model_used: None,
        analyzed_at: None,
    })
}

/// Split a tag answer on commas and hashes.
fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split([',', '#', '，']) {
        let tag = tag.trim();
        if tag.chars().count() > 1 && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_labels() {
        let response = "\
A1. Travel Vlog
A2: The footage follows a host walking through markets
and talking to the camera.
A3. Handheld shots, natural light
A4: #travel, #street food, market
A5: Live action
A6: Upbeat and casual
A7: Young travellers";

        let result = parse_labeled_response(response).unwrap();
        assert_eq!(result.genre, "Travel Vlog");
        assert_eq!(
            result.reasoning,
            "The footage follows a host walking through markets and talking to the camera."
        );
        assert_eq!(result.tags, vec!["travel", "street food", "market"]);
        assert_eq!(result.expression_style, "Live action");
        assert_eq!(result.target_audience, "Young travellers");
    }

    #[test]
    fn tolerates_markdown_labels() {
        let result = parse_labeled_response("**A1:** Documentary\n**A4:** history, war").unwrap();
        assert_eq!(result.genre, "Documentary");
        assert_eq!(result.tags, vec!["history", "war"]);
        assert!(result.reasoning.is_empty());
    }

    #[test]
    fn missing_genre_is_none() {
        assert!(parse_labeled_response("I cannot see the images.").is_none());
        assert!(parse_labeled_response("A2: reasons only").is_none());
    }

    #[test]
    fn tags_drop_single_chars_and_duplicates() {
        assert_eq!(split_tags("a, food, food, #x, drink"), vec!["food", "drink"]);
    }
}
