//! # Pipeline Runner
//!
//! Drives work items through a [`Pipeline`] one at a time:
//!
//! 1. check the constants every step declares
//! 2. pull the next item from the input stream and run its steps in order,
//!    stopping the item at its first failing step
//! 3. clean up the item's scratch data and record an [`ItemReport`]
//! 4. run post-steps for the items that succeeded
//! 5. run batch steps once, then clean up run-scoped scratch data

use super::claims::OutputClaims;
use super::scratch::ScratchSpace;
use super::step::{BatchContext, StepContext, StepOutcome, WorkflowConstants};
use super::{ErrorPolicy, Pipeline, PipelineStep};
use crate::backend::{FileSystemBackend, GeoprocessingBackend};
use crate::config::ConfigurationError;
use crate::error::{BackendError, BackendResult, GeobatchError, ItemError, Result};
use crate::logging::{log_error, log_item_operation, log_step_operation};
use crate::models::{BatchReport, ItemReport, StepResult, WorkItem};
use chrono::Utc;
use futures::{pin_mut, Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Owner recorded for outputs claimed by batch steps
const BATCH_OWNER: &str = "<batch>";

/// Explicit run environment, replacing process-wide workspace globals.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub overwrite_output: bool,
    pub error_policy: ErrorPolicy,
    /// Where scratch datasets are created unless a step's constants say
    /// otherwise
    pub scratch_workspace: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            overwrite_output: true,
            error_policy: ErrorPolicy::default(),
            scratch_workspace: PathBuf::from("."),
        }
    }
}

impl RunSettings {
    pub fn with_overwrite(mut self, overwrite_output: bool) -> Self {
        self.overwrite_output = overwrite_output;
        self
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn with_scratch_workspace<P: Into<PathBuf>>(mut self, scratch_workspace: P) -> Self {
        self.scratch_workspace = scratch_workspace.into();
        self
    }
}

/// Executes pipelines against a pair of backends.
pub struct PipelineRunner {
    geo: Arc<dyn GeoprocessingBackend>,
    fs: Arc<dyn FileSystemBackend>,
    settings: RunSettings,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    pub fn new(
        geo: Arc<dyn GeoprocessingBackend>,
        fs: Arc<dyn FileSystemBackend>,
        settings: RunSettings,
    ) -> Self {
        Self { geo, fs, settings }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn geo(&self) -> &Arc<dyn GeoprocessingBackend> {
        &self.geo
    }

    pub fn fs(&self) -> &Arc<dyn FileSystemBackend> {
        &self.fs
    }

    /// Run `pipeline` over every item of `items`.
    ///
    /// Item failures are recorded in the report; only a missing constant
    /// returns an error, and it does so before any item is pulled.
    pub async fn run<S>(
        &self,
        pipeline: &Pipeline,
        constants: &WorkflowConstants,
        items: S,
    ) -> Result<BatchReport>
    where
        S: Stream<Item = WorkItem>,
    {
        validate_constants(pipeline, constants)?;

        info!(
            pipeline = %pipeline.name(),
            steps = pipeline.steps().len(),
            post_steps = pipeline.post_steps().len(),
            batch_steps = pipeline.batch_steps().len(),
            overwrite_output = self.settings.overwrite_output,
            error_policy = ?self.settings.error_policy,
            "Starting batch"
        );

        let mut report = BatchReport::new(pipeline.name());
        let mut claims = OutputClaims::new();
        let run_scratch = ScratchSpace::new(format!("{}:run", pipeline.name()));

        pin_mut!(items);
        let mut position = 0;
        while let Some(item) = items.next().await {
            position += 1;
            let item_report = self
                .process_item(pipeline, constants, position, item, &mut claims, &run_scratch)
                .await;
            let failed = !item_report.succeeded();
            report.items.push(item_report);

            if failed && self.settings.error_policy == ErrorPolicy::AbortBatch {
                warn!(
                    pipeline = %pipeline.name(),
                    position = position,
                    "Item failed; aborting batch"
                );
                report.aborted = true;
                break;
            }
        }

        if !pipeline.post_steps().is_empty() {
            self.run_post_steps(pipeline, constants, &mut report, &mut claims, &run_scratch)
                .await;
        }

        if !pipeline.batch_steps().is_empty() {
            self.run_batch_steps(pipeline, constants, &mut report, &mut claims, &run_scratch)
                .await;
        }

        let deleted = run_scratch.cleanup(self.geo.as_ref(), self.fs.as_ref()).await;
        if deleted > 0 {
            debug!(pipeline = %pipeline.name(), deleted = deleted, "Run scratch cleaned up");
        }

        report.tally();
        report.finished_at = Some(Utc::now());

        info!(
            pipeline = %pipeline.name(),
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            aborted = report.aborted,
            batch_error = report.batch_error.is_some(),
            "Batch complete"
        );

        Ok(report)
    }

    async fn process_item(
        &self,
        pipeline: &Pipeline,
        constants: &WorkflowConstants,
        position: usize,
        item: WorkItem,
        claims: &mut OutputClaims,
        run_scratch: &ScratchSpace,
    ) -> ItemReport {
        log_item_operation(pipeline.name(), &item.id, position, "started");

        let mut item_report = ItemReport::new(position, item);
        let item_scratch = ScratchSpace::new(format!("{}:{}", pipeline.name(), item_report.item.id));

        self.run_item_steps(
            pipeline.name(),
            pipeline.steps(),
            0,
            constants,
            &mut item_report,
            claims,
            &item_scratch,
            run_scratch,
        )
        .await;

        item_scratch.cleanup(self.geo.as_ref(), self.fs.as_ref()).await;

        let status = if item_report.succeeded() { "completed" } else { "failed" };
        log_item_operation(pipeline.name(), &item_report.item.id, position, status);
        item_report
    }

    async fn run_post_steps(
        &self,
        pipeline: &Pipeline,
        constants: &WorkflowConstants,
        report: &mut BatchReport,
        claims: &mut OutputClaims,
        run_scratch: &ScratchSpace,
    ) {
        let offset = pipeline.steps().len();
        for item_report in report.items.iter_mut().filter(|item| item.succeeded()) {
            let item_scratch =
                ScratchSpace::new(format!("{}:{}:post", pipeline.name(), item_report.item.id));
            self.run_item_steps(
                pipeline.name(),
                pipeline.post_steps(),
                offset,
                constants,
                item_report,
                claims,
                &item_scratch,
                run_scratch,
            )
            .await;
            item_scratch.cleanup(self.geo.as_ref(), self.fs.as_ref()).await;

            if !item_report.succeeded() {
                log_item_operation(pipeline.name(), &item_report.item.id, item_report.position, "failed");
            }
        }
    }

    /// Run `steps` for one item, numbering them from `offset + 1`. Stops at
    /// the first failure and records it on the item.
    #[allow(clippy::too_many_arguments)]
    async fn run_item_steps(
        &self,
        pipeline_name: &str,
        steps: &[Box<dyn PipelineStep>],
        offset: usize,
        constants: &WorkflowConstants,
        item_report: &mut ItemReport,
        claims: &mut OutputClaims,
        item_scratch: &ScratchSpace,
        run_scratch: &ScratchSpace,
    ) {
        for (i, step) in steps.iter().enumerate() {
            let step_index = offset + i + 1;
            let started = Instant::now();
            let outcome = {
                let mut ctx = StepContext {
                    item: &item_report.item,
                    step_index,
                    constants,
                    geo: self.geo.as_ref(),
                    fs: self.fs.as_ref(),
                    prior: &item_report.results,
                    item_scratch,
                    run_scratch,
                    claims: &mut *claims,
                    settings: &self.settings,
                };
                step.execute(&mut ctx).await
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let (result, failure) = record_outcome(step_index, step.name(), outcome, duration_ms);
            log_step_operation(
                pipeline_name,
                &item_report.item.id,
                step_index,
                step.name(),
                &result.status.to_string(),
                duration_ms,
            );
            item_report.results.push(result);

            if let Some(error) = failure {
                let item_error = ItemError::new(step.name(), &item_report.item.id, step_index, &error);
                log_error(
                    "pipeline_runner",
                    step.name(),
                    &item_error.to_string(),
                    Some(pipeline_name),
                );
                item_report.error = Some(item_error);
                break;
            }
        }
    }

    async fn run_batch_steps(
        &self,
        pipeline: &Pipeline,
        constants: &WorkflowConstants,
        report: &mut BatchReport,
        claims: &mut OutputClaims,
        run_scratch: &ScratchSpace,
    ) {
        for (i, step) in pipeline.batch_steps().iter().enumerate() {
            let step_index = i + 1;
            let started = Instant::now();
            let outcome = {
                let mut ctx = BatchContext {
                    items: report.items.iter().filter(|item| item.succeeded()).collect(),
                    step_index,
                    constants,
                    geo: self.geo.as_ref(),
                    fs: self.fs.as_ref(),
                    prior: &report.batch_results,
                    run_scratch,
                    claims: &mut *claims,
                    settings: &self.settings,
                    owner: BATCH_OWNER,
                };
                step.execute(&mut ctx).await
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let (result, failure) = record_outcome(step_index, step.name(), outcome, duration_ms);
            log_step_operation(
                pipeline.name(),
                BATCH_OWNER,
                step_index,
                step.name(),
                &result.status.to_string(),
                duration_ms,
            );
            report.batch_results.push(result);

            if let Some(error) = failure {
                let batch_error = ItemError::new(step.name(), BATCH_OWNER, step_index, &error);
                log_error(
                    "pipeline_runner",
                    step.name(),
                    &batch_error.to_string(),
                    Some(pipeline.name()),
                );
                report.batch_error = Some(batch_error);
                break;
            }
        }
    }
}

fn record_outcome(
    step_index: usize,
    step_name: &str,
    outcome: BackendResult<StepOutcome>,
    duration_ms: u64,
) -> (StepResult, Option<BackendError>) {
    match outcome {
        Ok(StepOutcome::Completed(output)) => (
            StepResult::completed(step_index, step_name, output, duration_ms),
            None,
        ),
        Ok(StepOutcome::Skipped { reason }) => {
            debug!(step = %step_name, reason = %reason, "Step skipped");
            (StepResult::skipped(step_index, step_name, reason, duration_ms), None)
        }
        Err(error) => (
            StepResult::failed(step_index, step_name, error.to_string(), duration_ms),
            Some(error),
        ),
    }
}

/// Every constant any step declares must be present and non-blank.
fn validate_constants(pipeline: &Pipeline, constants: &WorkflowConstants) -> Result<()> {
    let required = pipeline.required_constants();
    if let Some(missing) = constants.missing(required.iter().copied()).first() {
        return Err(GeobatchError::Configuration(
            ConfigurationError::missing_required_field(*missing, format!("pipeline '{}'", pipeline.name())),
        ));
    }
    Ok(())
}

/// Turn a fatal precondition on a backend call into a run error
pub fn require_backend<T>(operation: &str, result: BackendResult<T>) -> Result<T> {
    result.map_err(|source| GeobatchError::backend(operation, source))
}
