//! cleanup stage - removes the per-video working directory.

use std::fs;
use std::path::PathBuf;

use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::{CleanupSummary, Context, StageRecord, CLEANUP_KEY};

/// Deletes `<temp_root>/<video_id>`. Runs after cache hits too; only
/// its own setting skips it. A failed removal is logged, not raised.
pub struct CleanupStage {
    temp_root: PathBuf,
    enabled: bool,
}

impl CleanupStage {
    pub fn new(temp_root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            temp_root: temp_root.into(),
            enabled,
        }
    }
}

impl PipelineStage for CleanupStage {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn description(&self) -> &str {
        "Remove temporary files"
    }

    fn can_skip(&self, _ctx: &Context) -> bool {
        !self.enabled
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        progress.update(99, "Cleaning up");
        let video_id = ctx.require_video_id()?.to_string();
        let path = self.temp_root.join(&video_id);

        let summary = if !path.exists() {
            ctx.logger.debug(&format!("Nothing to clean at {}", path.display()));
            CleanupSummary {
                path,
                removed: false,
                error: None,
            }
        } else {
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    ctx.logger.info(&format!("Removed {}", path.display()));
                    CleanupSummary {
                        path,
                        removed: true,
                        error: None,
                    }
                }
                Err(e) => {
                    ctx.logger
                        .warn(&format!("Cannot remove {}: {}", path.display(), e));
                    CleanupSummary {
                        path,
                        removed: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        };

        ctx.record(CLEANUP_KEY, StageRecord::Cleanup(summary));
        progress.update(100, &format!("Processing complete: {}", video_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("abc");
        fs::create_dir_all(session.join("scenes")).unwrap();
        fs::write(session.join("scenes/scene_0000.jpg"), b"x").unwrap();

        let mut ctx = Context::detached("u", false);
        ctx.video_id = Some("abc".to_string());
        CleanupStage::new(dir.path(), true)
            .execute(&mut ctx, &StageProgress::unbound("cleanup"))
            .unwrap();

        assert!(!session.exists());
        assert!(matches!(
            ctx.stage_results.get(CLEANUP_KEY),
            Some(StageRecord::Cleanup(CleanupSummary { removed: true, .. }))
        ));
    }

    #[test]
    fn missing_dir_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = Context::detached("u", false);
        ctx.video_id = Some("gone".to_string());

        CleanupStage::new(dir.path(), true)
            .execute(&mut ctx, &StageProgress::unbound("cleanup"))
            .unwrap();
        assert!(matches!(
            ctx.stage_results.get(CLEANUP_KEY),
            Some(StageRecord::Cleanup(CleanupSummary { removed: false, .. }))
        ));
    }

    #[test]
    fn only_the_setting_skips() {
        let mut ctx = Context::detached("u", false);
        ctx.record(crate::orchestrator::types::CACHE_HIT_KEY, StageRecord::CacheHit);

        assert!(!CleanupStage::new("t", true).can_skip(&ctx));
        assert!(CleanupStage::new("t", false).can_skip(&ctx));
    }
}
