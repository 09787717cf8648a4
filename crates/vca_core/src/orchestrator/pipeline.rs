//! Pipeline runner that executes stages in sequence.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Local;

use crate::logging::{LogConfig, RunLogger, RunLoggerBuilder};

use super::errors::{PipelineError, PipelineResult};
use super::stage::{PipelineStage, Stage};
use super::types::{Context, ProgressCallback, StageStatus};

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// Pipeline that runs a sequence of stages.
///
/// Stages run in insertion order on the calling thread. The first failing
/// stage stops the run; later stages never start. Executing requires
/// `&mut self`, so one pipeline serves one run at a time.
pub struct Pipeline {
    id: u64,
    /// Stages to execute in order.
    stages: Vec<Stage>,
    /// Directory for per-run log files. `None` keeps logs in memory.
    log_dir: Option<PathBuf>,
    log_config: LogConfig,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            id: NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed),
            stages: Vec::new(),
            log_dir: None,
            log_config: LogConfig::default(),
        }
    }

    /// Process-unique id of this pipeline instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Add a stage to the pipeline.
    pub fn add_stage<S: PipelineStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.stages.push(Stage::new(Box::new(stage)));
        self
    }

    /// Add a stage (builder pattern).
    pub fn with_stage<S: PipelineStage + 'static>(mut self, stage: S) -> Self {
        self.add_stage(stage);
        self
    }

    /// Add an already boxed stage (builder pattern).
    pub fn with_boxed_stage(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(Stage::new(stage));
        self
    }

    /// Write one log file per run into `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Run every stage for `url`.
    ///
    /// Returns the final context on success. On the first stage failure
    /// the stage is logged, `("error", 0, "<stage> failed: <msg>")` is
    /// reported, and the stage's error is returned. No partial context is
    /// handed back.
    pub fn execute(
        &mut self,
        url: &str,
        force_reanalyze: bool,
        progress: Option<ProgressCallback>,
    ) -> PipelineResult<Context> {
        let logger = Arc::new(self.build_logger());
        let mut ctx = Context::new(url, force_reanalyze, logger);

        ctx.logger.section(&format!("Processing {}", url));
        if force_reanalyze {
            ctx.logger.info("Forced re-analysis, cache will be ignored");
        }

        for stage in &mut self.stages {
            stage.reset();
            ctx.set_stage_status(stage.name(), StageStatus::Pending);
        }

        for stage in &mut self.stages {
            if let Err(e) = stage.run(&mut ctx, progress.clone()) {
                let name = stage.name().to_string();
                ctx.logger
                    .error(&format!("Pipeline failed at stage '{}'", name));
                ctx.logger.show_tail(&name);
                if let Some(ref callback) = progress {
                    callback("error", 0, &format!("{} failed: {}", name, e));
                }
                ctx.logger.close();
                return Err(PipelineError::stage_failed(name, e));
            }
        }

        let elapsed = Local::now() - ctx.started_at;
        ctx.logger.success(&format!(
            "Pipeline completed in {:.2}s",
            elapsed.num_milliseconds() as f64 / 1000.0
        ));
        ctx.logger.flush();

        Ok(ctx)
    }

    /// Get the number of stages in the pipeline.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Get stage names in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Status of each stage from the most recent run.
    pub fn stage_statuses(&self) -> Vec<(&str, StageStatus)> {
        self.stages.iter().map(|s| (s.name(), s.status())).collect()
    }

    fn build_logger(&self) -> RunLogger {
        let run_name = format!("run_{}_{}", Local::now().format("%Y%m%d_%H%M%S"), self.id);
        let builder = RunLoggerBuilder::new(run_name).config(self.log_config.clone());
        match self.log_dir {
            Some(ref dir) => builder.log_dir(dir).build(),
            None => builder.build(),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Completed and skipped stage names of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRunResult {
    /// Stages that completed successfully.
    pub stages_completed: Vec<String>,
    /// Stages that were skipped.
    pub stages_skipped: Vec<String>,
}

impl PipelineRunResult {
    pub fn from_context(ctx: &Context) -> Self {
        let names = |status| {
            ctx.stages_with_status(status)
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        Self {
            stages_completed: names(StageStatus::Success),
            stages_skipped: names(StageStatus::Skipped),
        }
    }

    /// Check if all stages completed (none skipped).
    pub fn all_completed(&self) -> bool {
        self.stages_skipped.is_empty()
    }

    /// Total number of stages that ran or were skipped.
    pub fn total_stages(&self) -> usize {
        self.stages_completed.len() + self.stages_skipped.len()
    }
}
