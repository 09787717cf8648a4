//! storage_upload stage - best-effort upload of run artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use crate::config::StorageSettings;
use crate::models::{StorageBackend, Video};
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::{Context, StageRecord, UploadSummary, STORAGE_UPLOAD_KEY};
use crate::services::RemoteStorage;

const ANALYSIS_FILE: &str = "analysis_result.json";

/// Uploads the video, thumbnail, frames and analysis JSON under
/// `<remote_base>/<video_id>/`.
///
/// Never fails the run: each failed file is logged and listed in the
/// recorded `UploadSummary`.
pub struct StorageUploadStage {
    storage: Arc<dyn RemoteStorage>,
    settings: StorageSettings,
}

impl StorageUploadStage {
    pub fn new(storage: Arc<dyn RemoteStorage>, settings: StorageSettings) -> Self {
        Self { storage, settings }
    }
}

impl PipelineStage for StorageUploadStage {
    fn name(&self) -> &str {
        "storage_upload"
    }

    fn description(&self) -> &str {
        "Upload artifacts to remote storage"
    }

    fn can_skip(&self, ctx: &Context) -> bool {
        ctx.is_cache_hit()
            || (self.storage.backend() == StorageBackend::Local && self.settings.skip_local)
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        progress.update(85, &format!("Uploading to {}", self.storage.name()));

        let video_id = ctx.require_video_id()?.to_string();
        let remote_dir = format!(
            "{}/{}",
            self.settings.remote_base.trim_end_matches('/'),
            video_id
        );
        let mut summary = UploadSummary {
            backend: self.storage.backend(),
            remote_dir: remote_dir.clone(),
            ..Default::default()
        };

        let files = match ctx.video.as_ref() {
            Some(video) => collect_artifacts(video, &video_id, &ctx.logger),
            None => Vec::new(),
        };
        if files.is_empty() {
            ctx.logger.warn("Nothing to upload");
        }

        let total = files.len();
        for (i, (local, remote_name)) in files.iter().enumerate() {
            let remote_path = format!("{}/{}", remote_dir, remote_name);
            if self.storage.upload_file(local, &remote_path) {
                summary.uploaded.push(remote_path);
            } else {
                ctx.logger
                    .warn(&format!("Upload failed: {}", local.display()));
                summary.failed.push(local.clone());
            }
            let percent = 85 + ((i + 1) * 10 / total) as u32;
            progress.update(percent, &format!("Uploaded {}/{}", i + 1, total));
        }

        let message = format!(
            "Upload complete: {}/{} files",
            summary.uploaded.len(),
            summary.total()
        );
        if summary.all_succeeded() {
            ctx.logger.info(&message);
        } else {
            ctx.logger.warn(&message);
        }
        progress.update(95, &message);

        ctx.record(STORAGE_UPLOAD_KEY, StageRecord::Upload(summary));
        Ok(())
    }
}

/// Local files to upload paired with their remote names, in upload order.
fn collect_artifacts(
    video: &Video,
    video_id: &str,
    logger: &crate::logging::RunLogger,
) -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();

    if let Some(ref path) = video.local_path {
        if path.is_file() {
            files.push((path.clone(), file_name(path)));
        }
    }

    let Some(ref session_dir) = video.session_dir else {
        return files;
    };

    let thumbnail = session_dir.join(format!("{}_Thumbnail.jpg", video_id));
    if thumbnail.is_file() {
        files.push((thumbnail.clone(), file_name(&thumbnail)));
    }

    for sub in ["scenes", "grouped"] {
        for frame in jpg_files(&session_dir.join(sub)) {
            let remote = format!("{}/{}", sub, file_name(&frame));
            files.push((frame, remote));
        }
    }

    let analysis_path = session_dir.join(ANALYSIS_FILE);
    if !analysis_path.exists() {
        if let Err(e) = write_analysis_json(video, &analysis_path) {
            logger.warn(&format!("Cannot write {}: {}", ANALYSIS_FILE, e));
        }
    }
    if analysis_path.is_file() {
        files.push((analysis_path, ANALYSIS_FILE.to_string()));
    }

    files
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Sorted `.jpg` files directly inside `dir`.
fn jpg_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut frames: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg"))
        })
        .collect();
    frames.sort();
    frames
}

fn write_analysis_json(video: &Video, path: &Path) -> std::io::Result<()> {
    let scenes: Vec<String> = video.scenes.iter().map(|s| s.frame_file_name()).collect();
    let document = json!({
        "video_id": video.session_id,
        "url": video.url,
        "metadata": video.metadata,
        "analysis": video.analysis_result,
        "scenes": scenes,
        "created_at": video.created_at.to_rfc3339(),
    });
    let text = serde_json::to_string_pretty(&document)?;
    fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisResult;
    use crate::orchestrator::testing::RecordingStorage;

    fn session(dir: &Path) -> Context {
        let session_dir = dir.join("abc");
        fs::create_dir_all(session_dir.join("scenes")).unwrap();
        fs::write(session_dir.join("abc.mp4"), b"video").unwrap();
        fs::write(session_dir.join("abc_Thumbnail.jpg"), b"thumb").unwrap();
        fs::write(session_dir.join("scenes/scene_0001.jpg"), b"f1").unwrap();
        fs::write(session_dir.join("scenes/scene_0000.jpg"), b"f0").unwrap();
        fs::write(session_dir.join("scenes/notes.txt"), b"skip").unwrap();

        let mut video = Video::new("abc", "https://youtu.be/abc").with_local_path(session_dir.join("abc.mp4"));
        video.session_dir = Some(session_dir);
        video.analysis_result = Some(AnalysisResult {
            genre: "Vlog".to_string(),
            ..Default::default()
        });

        let mut ctx = Context::detached("https://youtu.be/abc", false);
        ctx.video_id = Some("abc".to_string());
        ctx.video = Some(video);
        ctx
    }

    fn webdav_settings() -> StorageSettings {
        StorageSettings {
            backend: StorageBackend::WebDav,
            ..Default::default()
        }
    }

    #[test]
    fn uploads_artifacts_under_remote_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RecordingStorage::webdav());
        let stage = StorageUploadStage::new(storage.clone(), webdav_settings());
        let mut ctx = session(dir.path());

        stage
            .execute(&mut ctx, &StageProgress::unbound("storage_upload"))
            .unwrap();

        assert_eq!(
            storage.remote_paths(),
            vec![
                "video_analysis/abc/abc.mp4",
                "video_analysis/abc/abc_Thumbnail.jpg",
                "video_analysis/abc/scenes/scene_0000.jpg",
                "video_analysis/abc/scenes/scene_0001.jpg",
                "video_analysis/abc/analysis_result.json",
            ]
        );
        assert!(dir.path().join("abc/analysis_result.json").is_file());
        match ctx.stage_results.get(STORAGE_UPLOAD_KEY) {
            Some(StageRecord::Upload(summary)) => {
                assert_eq!(summary.uploaded.len(), 5);
                assert!(summary.all_succeeded());
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn failed_uploads_do_not_fail_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RecordingStorage::webdav().rejecting("scene_0001.jpg"));
        let stage = StorageUploadStage::new(storage, webdav_settings());
        let mut ctx = session(dir.path());

        stage
            .execute(&mut ctx, &StageProgress::unbound("storage_upload"))
            .unwrap();

        assert!(ctx.errors.is_empty());
        match ctx.stage_results.get(STORAGE_UPLOAD_KEY) {
            Some(StageRecord::Upload(summary)) => {
                assert_eq!(summary.failed.len(), 1);
                assert_eq!(summary.uploaded.len(), 4);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn skips_local_backend_when_configured() {
        let local = StorageUploadStage::new(
            Arc::new(RecordingStorage::local()),
            StorageSettings::default(),
        );
        let ctx = Context::detached("u", false);
        assert!(local.can_skip(&ctx));

        let webdav = StorageUploadStage::new(Arc::new(RecordingStorage::webdav()), webdav_settings());
        assert!(!webdav.can_skip(&ctx));
    }
}
