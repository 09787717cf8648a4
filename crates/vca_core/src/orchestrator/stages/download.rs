//! download stage - fetches the video into its working directory.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::models::Video;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::Context;
use crate::services::VideoDownloader;

/// Downloads the video into `<temp_root>/<video_id>`.
pub struct DownloadStage {
    downloader: Arc<dyn VideoDownloader>,
    temp_root: PathBuf,
}

impl DownloadStage {
    pub fn new(downloader: Arc<dyn VideoDownloader>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            temp_root: temp_root.into(),
        }
    }
}

impl PipelineStage for DownloadStage {
    fn name(&self) -> &str {
        "download"
    }

    fn description(&self) -> &str {
        "Download the video and its metadata"
    }

    fn can_skip(&self, ctx: &Context) -> bool {
        ctx.is_cache_hit()
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        progress.update(0, "Downloading video");
        let video_id = ctx.require_video_id()?.to_string();

        let session_dir = self.temp_root.join(&video_id);
        fs::create_dir_all(&session_dir)
            .map_err(|e| StageError::io("creating session directory", e))?;

        ctx.logger.command(&format!("download {} -> {}", ctx.url(), session_dir.display()));
        let logger = Arc::clone(&ctx.logger);
        let result = self.downloader.download(
            ctx.url(),
            &video_id,
            &session_dir,
            &|line, is_stderr| logger.output_line(line, is_stderr),
        )?;
        ctx.logger.info(&format!(
            "Downloaded '{}' ({:.0}s) to {}",
            result.title,
            result.duration,
            result.file_path.display()
        ));

        let mut video = Video::new(&video_id, ctx.url()).with_local_path(&result.file_path);
        video.session_dir = Some(session_dir);

        ctx.video = Some(video);
        ctx.download_result = Some(result);

        progress.update(100, "Download complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::FakeDownloader;

    #[test]
    fn creates_session_dir_and_video() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Arc::new(FakeDownloader::new());
        let stage = DownloadStage::new(downloader.clone(), dir.path());
        let mut ctx = Context::detached("https://youtu.be/dQw4w9WgXcQ", false);
        ctx.video_id = Some("dQw4w9WgXcQ".to_string());

        stage
            .execute(&mut ctx, &StageProgress::unbound("download"))
            .unwrap();

        let video = ctx.video.as_ref().unwrap();
        assert_eq!(video.session_dir.as_deref(), Some(dir.path().join("dQw4w9WgXcQ").as_path()));
        assert!(video.local_path.as_ref().unwrap().is_file());
        assert!(ctx.download_result.is_some());
        assert_eq!(downloader.calls(), 1);
    }

    #[test]
    fn downloader_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let stage = DownloadStage::new(Arc::new(FakeDownloader::failing()), dir.path());
        let mut ctx = Context::detached("https://youtu.be/dQw4w9WgXcQ", false);
        ctx.video_id = Some("dQw4w9WgXcQ".to_string());

        let err = stage
            .execute(&mut ctx, &StageProgress::unbound("download"))
            .unwrap_err();
        assert!(matches!(err, StageError::CommandFailed { .. }));
        assert!(ctx.video.is_none());
        assert!(ctx
            .logger
            .get_tail()
            .iter()
            .any(|l| l.contains("Video unavailable")));
    }
}
