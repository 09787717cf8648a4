//! Data models for the video content analyzer.
//!
//! This module contains the core data structures shared by the pipeline
//! and its collaborators:
//! - Enums for platforms, AI providers, storage backends
//! - The `Video` result object with its metadata and scenes
//! - AI analysis results and their stored records
//! - Repository records and statistics

mod analysis;
mod enums;
mod records;
mod video;

pub use analysis::{AnalysisRecord, AnalysisResult};
pub use enums::{AiProvider, Platform, SceneType, StorageBackend};
pub use records::{LabelCount, Statistics, VideoRecord};
pub use video::{Scene, Video, VideoMetadata, SHORT_FORM_MAX_SECONDS};
