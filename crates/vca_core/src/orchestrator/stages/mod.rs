//! Pipeline stage implementations.

mod ai_analysis;
mod cache_check;
mod cleanup;
mod download;
mod metadata;
mod notion_sync;
mod scene_extraction;
mod storage_upload;
mod url_parse;

pub use ai_analysis::AiAnalysisStage;
pub use cache_check::CacheCheckStage;
pub use cleanup::CleanupStage;
pub use download::DownloadStage;
pub use metadata::MetadataStage;
pub use notion_sync::NotionSyncStage;
pub use scene_extraction::SceneExtractionStage;
pub use storage_upload::StorageUploadStage;
pub use url_parse::UrlParseStage;
