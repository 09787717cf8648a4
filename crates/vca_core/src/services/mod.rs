//! External collaborators used by the pipeline stages.
//!
//! Each collaborator sits behind a narrow trait so the pipeline can be
//! wired with real implementations or test doubles:
//!
//! ```text
//! resolver    parse_video_url      URL -> (platform, id)
//! repository  VideoRepository      video info + analysis history
//! downloader  VideoDownloader      yt-dlp
//! scenes      SceneExtractor       ffmpeg scene detection
//! grouping    SceneGrouping        perceptual frame grouping
//! analyzer    VisionAnalyzer       AI classification
//! providers   HttpVisionAnalyzer   OpenAI / Claude / Gemini clients
//! storage     RemoteStorage        local copy / WebDAV
//! notion      DatabaseSync         Notion pages
//! ```

mod analyzer;
mod downloader;
mod grouping;
mod notion;
mod providers;
mod repository;
mod resolver;
mod scenes;
mod storage;

pub use analyzer::{parse_labeled_response, AnalyzerError, AnalyzerFactory, VisionAnalyzer};
pub use downloader::{DownloadError, DownloadResult, VideoDownloader, YtDlpDownloader};
pub use grouping::{save_grouped, SceneGrouping};
pub use notion::{build_properties, DatabaseSync, NotionClient, NotionError};
pub use providers::{default_analyzer_factory, HttpVisionAnalyzer};
pub use repository::{RepositoryError, RepositoryResult, VideoDatabase, VideoRepository};
pub use resolver::{parse_video_url, ParsedUrl, UrlError};
pub use scenes::{
    FfmpegSceneExtractor, SceneDetectionParams, SceneError, SceneExtraction, SceneExtractor,
};
pub use storage::{create_storage, LocalStorage, RemoteStorage, StorageError, WebDavStorage};

/// Feed a tool's captured output to `sink` one non-empty line at a time.
pub(crate) fn forward_output(bytes: &[u8], is_stderr: bool, sink: &dyn Fn(&str, bool)) {
    for line in String::from_utf8_lossy(bytes).lines() {
        if !line.trim().is_empty() {
            sink(line, is_stderr);
        }
    }
}
