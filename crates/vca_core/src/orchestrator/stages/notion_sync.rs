//! notion_sync stage - best-effort sync to the remote database.

use std::sync::Arc;

use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::{PipelineStage, StageProgress};
use crate::orchestrator::types::{Context, StageRecord, SyncSummary, NOTION_SYNC_KEY};
use crate::services::DatabaseSync;

/// Pushes the analyzed video to Notion.
///
/// Skipped on a cache hit, when auto upload is off, or when no client is
/// configured. A failed sync is logged and recorded, never propagated.
pub struct NotionSyncStage {
    sync: Option<Arc<dyn DatabaseSync>>,
    auto_upload: bool,
}

impl NotionSyncStage {
    pub fn new(sync: Option<Arc<dyn DatabaseSync>>, auto_upload: bool) -> Self {
        Self { sync, auto_upload }
    }
}

impl PipelineStage for NotionSyncStage {
    fn name(&self) -> &str {
        "notion_sync"
    }

    fn description(&self) -> &str {
        "Sync the analysis to Notion"
    }

    fn can_skip(&self, ctx: &Context) -> bool {
        ctx.is_cache_hit() || !self.auto_upload || self.sync.is_none()
    }

    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
        let Some(ref sync) = self.sync else {
            return Ok(());
        };

        let summary = match (ctx.video.as_ref(), ctx.analysis_result.as_ref()) {
            (Some(video), Some(analysis)) => {
                progress.update(96, "Syncing to Notion");
                match sync.add_video_to_database(video, analysis) {
                    Ok(page_id) => {
                        ctx.logger.info(&format!("Notion page: {}", page_id));
                        progress.update(98, "Notion sync complete");
                        SyncSummary {
                            success: true,
                            message: page_id,
                        }
                    }
                    Err(e) => {
                        ctx.logger.warn(&format!("Notion sync failed: {}", e));
                        progress.update(98, "Notion sync failed");
                        SyncSummary {
                            success: false,
                            message: e.to_string(),
                        }
                    }
                }
            }
            _ => {
                ctx.logger.warn("No analysis to sync");
                SyncSummary {
                    success: false,
                    message: "no analysis result".to_string(),
                }
            }
        };

        ctx.record(NOTION_SYNC_KEY, StageRecord::Sync(summary));
        Ok(())
    }
}
