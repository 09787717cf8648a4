//! AI analysis results and their persisted form.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Structured classification returned by a vision analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub genre: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub features: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub expression_style: String,
    #[serde(default)]
    pub mood_tone: String,
    #[serde(default)]
    pub target_audience: String,
    /// `provider:model` that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    /// Set when the result was restored from the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Local>>,
}

/// One stored analysis of a video. A video may have many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub video_id: String,
    pub genre: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub features: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub expression_style: String,
    #[serde(default)]
    pub mood_tone: String,
    #[serde(default)]
    pub target_audience: String,
    /// File names of the frames that were sent to the model.
    #[serde(default)]
    pub analyzed_scenes: Vec<String>,
    pub model_used: String,
    pub analysis_date: DateTime<Local>,
}

impl AnalysisRecord {
    /// Build a record from a fresh analysis.
    pub fn from_result(
        video_id: impl Into<String>,
        result: &AnalysisResult,
        analyzed_scenes: Vec<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            genre: result.genre.clone(),
            reasoning: result.reasoning.clone(),
            features: result.features.clone(),
            tags: result.tags.clone(),
            expression_style: result.expression_style.clone(),
            mood_tone: result.mood_tone.clone(),
            target_audience: result.target_audience.clone(),
            analyzed_scenes,
            model_used: result
                .model_used
                .clone()
                .unwrap_or_else(|| fallback_model.into()),
            analysis_date: Local::now(),
        }
    }

    /// Restore the analyzer-facing view of this record.
    pub fn to_result(&self) -> AnalysisResult {
        AnalysisResult {
            genre: self.genre.clone(),
            reasoning: self.reasoning.clone(),
            features: self.features.clone(),
            tags: self.tags.clone(),
            expression_style: self.expression_style.clone(),
            mood_tone: self.mood_tone.clone(),
            target_audience: self.target_audience.clone(),
            model_used: Some(self.model_used.clone()),
            analyzed_at: Some(self.analysis_date),
        }
    }
}
