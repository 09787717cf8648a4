//! Pipeline stage trait and the per-run stage runner.

use std::sync::Arc;
use std::time::Instant;

use crate::logging::RunLogger;

use super::errors::StageResult;
use super::types::{Context, ProgressCallback, StageStatus};

/// Trait for pipeline stages.
///
/// The runner calls these methods in order:
///
/// 1. `can_skip` - decide from the context whether to do nothing this run
/// 2. `execute` - perform the stage's work and write its results into the context
///
/// # Example
///
/// ```ignore
/// struct DownloadStage { downloader: Arc<dyn VideoDownloader> }
///
/// impl PipelineStage for DownloadStage {
///     fn name(&self) -> &str { "download" }
///
///     fn can_skip(&self, ctx: &Context) -> bool {
///         ctx.is_cache_hit()
///     }
///
///     fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
///         progress.update(0, "Downloading video");
///         let logger = Arc::clone(&ctx.logger);
///         let result = self.downloader.download(ctx.url(), id, &dir, &|line, is_stderr| {
///             logger.output_line(line, is_stderr)
///         })?;
///         ctx.download_result = Some(result);
///         progress.update(100, "Download complete");
///         Ok(())
///     }
/// }
/// ```
pub trait PipelineStage: Send + Sync {
    /// Stable stage name (used in progress, logs and error tags).
    fn name(&self) -> &str;

    /// Whether this stage does nothing for the current run.
    ///
    /// Must not modify anything. Default is `false`.
    fn can_skip(&self, _ctx: &Context) -> bool {
        false
    }

    /// Execute the stage's work. An error is fatal to the run.
    fn execute(&self, ctx: &mut Context, progress: &StageProgress) -> StageResult<()>;

    /// Human-readable description of what this stage does.
    fn description(&self) -> &str {
        self.name()
    }
}

/// Progress reporter bound to one stage for one run.
///
/// Forwards `(stage, percent, message)` to the run's callback and the
/// run log. Does nothing for the callback when none is bound.
#[derive(Clone)]
pub struct StageProgress {
    stage: String,
    callback: Option<ProgressCallback>,
    logger: Option<Arc<RunLogger>>,
}

impl StageProgress {
    pub fn new(
        stage: impl Into<String>,
        callback: Option<ProgressCallback>,
        logger: Option<Arc<RunLogger>>,
    ) -> Self {
        Self {
            stage: stage.into(),
            callback,
            logger,
        }
    }

    /// A reporter with nothing bound.
    pub fn unbound(stage: impl Into<String>) -> Self {
        Self::new(stage, None, None)
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn is_bound(&self) -> bool {
        self.callback.is_some()
    }

    /// Report progress for this stage.
    pub fn update(&self, percent: u32, message: &str) {
        let percent = percent.min(100);
        if let Some(ref logger) = self.logger {
            logger.progress(&self.stage, percent, message);
        }
        if let Some(ref callback) = self.callback {
            callback(&self.stage, percent, message);
        }
    }
}

/// A stage in a pipeline together with its per-run state.
pub struct Stage {
    inner: Box<dyn PipelineStage>,
    status: StageStatus,
    progress: StageProgress,
}

impl Stage {
    pub fn new(inner: Box<dyn PipelineStage>) -> Self {
        let progress = StageProgress::unbound(inner.name());
        Self {
            inner,
            status: StageStatus::Pending,
            progress,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Return to `Pending` and drop the bound callback.
    pub fn reset(&mut self) {
        self.status = StageStatus::Pending;
        self.progress = StageProgress::unbound(self.inner.name());
    }

    /// Run the stage once.
    ///
    /// Binds the callback, consults `can_skip`, then executes and times the
    /// stage. A failure is tagged `[name] message` in `ctx.errors` and
    /// returned unchanged. The callback is unbound again before returning.
    pub fn run(&mut self, ctx: &mut Context, callback: Option<ProgressCallback>) -> StageResult<()> {
        let name = self.inner.name().to_string();
        self.progress = StageProgress::new(&name, callback, Some(Arc::clone(&ctx.logger)));
        let result = self.run_bound(ctx, &name);
        self.progress = StageProgress::unbound(&name);
        result
    }

    fn run_bound(&mut self, ctx: &mut Context, name: &str) -> StageResult<()> {
        self.set_status(ctx, StageStatus::Running);

        if self.inner.can_skip(ctx) {
            self.set_status(ctx, StageStatus::Skipped);
            ctx.logger.skipped(&format!("{} skipped", name));
            return Ok(());
        }

        // Tail only holds this stage's output
        ctx.logger.clear_tail();
        ctx.logger.phase(name);
        ctx.logger.reset_progress();
        let started = Instant::now();

        match self.inner.execute(ctx, &self.progress) {
            Ok(()) => {
                self.set_status(ctx, StageStatus::Success);
                ctx.logger.success(&format!(
                    "{} completed in {:.2}s",
                    name,
                    started.elapsed().as_secs_f64()
                ));
                Ok(())
            }
            Err(e) => {
                self.set_status(ctx, StageStatus::Failed);
                ctx.errors.push(format!("[{}] {}", name, e));
                ctx.logger.error(&format!("{} failed: {}", name, e));
                Err(e)
            }
        }
    }

    /// Forward progress through the bound callback. No-op when unbound.
    pub fn update_progress(&self, percent: u32, message: &str) {
        self.progress.update(percent, message);
    }

    fn set_status(&mut self, ctx: &mut Context, status: StageStatus) {
        self.status = status;
        ctx.set_stage_status(self.inner.name(), status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::errors::StageError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedStage {
        skip: bool,
        fail: bool,
        executed: Arc<AtomicUsize>,
    }

    impl PipelineStage for ScriptedStage {
        fn name(&self) -> &str {
            "scripted"
        }

        fn can_skip(&self, _ctx: &Context) -> bool {
            self.skip
        }

        fn execute(&self, _ctx: &mut Context, progress: &StageProgress) -> StageResult<()> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            progress.update(50, "halfway");
            if self.fail {
                return Err(StageError::other("boom"));
            }
            Ok(())
        }
    }

    fn stage(skip: bool, fail: bool) -> (Stage, Arc<AtomicUsize>) {
        let executed = Arc::new(AtomicUsize::new(0));
        let inner = ScriptedStage {
            skip,
            fail,
            executed: Arc::clone(&executed),
        };
        (Stage::new(Box::new(inner)), executed)
    }

    #[test]
    fn skip_is_consulted_before_execute() {
        let (mut stage, executed) = stage(true, false);
        let mut ctx = Context::detached("u", false);

        stage.run(&mut ctx, None).unwrap();

        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(stage.status(), StageStatus::Skipped);
        assert_eq!(ctx.stage_status("scripted"), Some(StageStatus::Skipped));
    }

    #[test]
    fn failure_is_tagged_and_propagated() {
        let (mut stage, _) = stage(false, true);
        let mut ctx = Context::detached("u", false);

        let err = stage.run(&mut ctx, None).unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(stage.status(), StageStatus::Failed);
        assert_eq!(ctx.errors, vec!["[scripted] boom".to_string()]);
    }

    #[test]
    fn progress_goes_to_bound_callback() {
        let (mut stage, _) = stage(false, false);
        let mut ctx = Context::detached("u", false);
        let seen: Arc<Mutex<Vec<(String, u32, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |stage: &str, pct: u32, msg: &str| {
            sink.lock().push((stage.to_string(), pct, msg.to_string()));
        });

        stage.run(&mut ctx, Some(callback)).unwrap();

        let seen = seen.lock();
        assert_eq!(*seen, vec![("scripted".to_string(), 50, "halfway".to_string())]);
        assert_eq!(stage.status(), StageStatus::Success);
    }

    #[test]
    fn callback_is_unbound_after_run() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |_: &str, _: u32, _: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for (skip, fail) in [(false, false), (false, true), (true, false)] {
            let (mut stage, _) = stage(skip, fail);
            let mut ctx = Context::detached("u", false);
            let _ = stage.run(&mut ctx, Some(Arc::clone(&callback)));
            let before = seen.load(Ordering::SeqCst);
            assert!(!stage.progress.is_bound());

            stage.update_progress(120, "late");

            assert_eq!(seen.load(Ordering::SeqCst), before);
        }
        // Only the two executed runs reported "halfway"
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        // No stage keeps a clone of the callback
        assert_eq!(Arc::strong_count(&callback), 1);
    }

    #[test]
    fn tail_is_cleared_at_stage_start() {
        let (mut stage, _) = stage(false, true);
        let mut ctx = Context::detached("u", false);
        ctx.logger.output_line("left over from an earlier stage", true);

        stage.run(&mut ctx, None).unwrap_err();

        let tail = ctx.logger.get_tail();
        assert!(!tail.iter().any(|l| l.contains("left over")));
        assert!(tail.iter().any(|l| l.contains("scripted failed")));
    }

    #[test]
    fn unbound_progress_is_noop() {
        let (stage, _) = stage(false, false);
        stage.update_progress(10, "nobody listening");
        assert_eq!(stage.status(), StageStatus::Pending);
    }
}
