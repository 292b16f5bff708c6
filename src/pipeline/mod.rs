//! # Pipeline
//!
//! A pipeline is a named, ordered list of steps applied to every work item,
//! followed by optional post-steps (a second pass over the items that
//! succeeded) and batch steps (aggregate operations run once).
//!
//! ```rust,no_run
//! use geobatch::pipeline::{Pipeline, PipelineRunner, RunSettings, WorkflowConstants};
//! use geobatch::backend::{LocalFileSystem, MemoryBackend};
//! use geobatch::models::WorkItem;
//! use std::sync::Arc;
//!
//! # async fn example(pipeline: Pipeline) -> geobatch::Result<()> {
//! let runner = PipelineRunner::new(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(LocalFileSystem::new()),
//!     RunSettings::default(),
//! );
//! let items = futures::stream::iter(vec![WorkItem::new("SBI_12")]);
//! let report = runner.run(&pipeline, &WorkflowConstants::new(), items).await?;
//! println!("{} of {} items succeeded", report.succeeded, report.processed);
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod derived;
pub mod runner;
pub mod scratch;
pub mod step;

use crate::config::{ConfigResult, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub use claims::OutputClaims;
pub use derived::{percent_shares, round_to};
pub use runner::{require_backend, PipelineRunner, RunSettings};
pub use scratch::{scratch_name, ScratchSpace};
pub use step::{sanitize, BatchContext, BatchStep, PipelineStep, StepContext, StepOutcome, WorkflowConstants};

/// What happens to the rest of the batch when an item fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the failure and move on to the next item
    #[default]
    ContinueWithNextItem,
    /// Stop pulling items after the first failure
    AbortBatch,
}

/// A named sequence of steps.
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn PipelineStep>>,
    post_steps: Vec<Box<dyn PipelineStep>>,
    batch_steps: Vec<Box<dyn BatchStep>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field(
                "batch_steps",
                &self.batch_steps.iter().map(|step| step.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Pipeline {
    pub fn builder<S: Into<String>>(name: S) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            steps: Vec::new(),
            post_steps: Vec::new(),
            batch_steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Box<dyn PipelineStep>] {
        &self.steps
    }

    pub fn post_steps(&self) -> &[Box<dyn PipelineStep>] {
        &self.post_steps
    }

    pub fn batch_steps(&self) -> &[Box<dyn BatchStep>] {
        &self.batch_steps
    }

    /// Per-item step names in execution order, post-steps included
    pub fn step_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .chain(self.post_steps.iter())
            .map(|step| step.name())
            .collect()
    }

    /// Union of the constants declared by every step
    pub fn required_constants(&self) -> BTreeSet<&'static str> {
        self.steps
            .iter()
            .chain(self.post_steps.iter())
            .flat_map(|step| step.required_constants().iter().copied())
            .chain(
                self.batch_steps
                    .iter()
                    .flat_map(|step| step.required_constants().iter().copied()),
            )
            .collect()
    }
}

pub struct PipelineBuilder {
    name: String,
    steps: Vec<Box<dyn PipelineStep>>,
    post_steps: Vec<Box<dyn PipelineStep>>,
    batch_steps: Vec<Box<dyn BatchStep>>,
}

impl PipelineBuilder {
    fn first_duplicate(&self) -> Option<String> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .chain(self.post_steps.iter())
            .map(|step| step.name())
            .chain(self.batch_steps.iter().map(|step| step.name()))
            .find(|name| !seen.insert(*name))
            .map(str::to_string)
    }

    pub fn step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn post_step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.post_steps.push(Box::new(step));
        self
    }

    pub fn batch_step<S: BatchStep + 'static>(mut self, step: S) -> Self {
        self.batch_steps.push(Box::new(step));
        self
    }

    pub fn build(self) -> ConfigResult<Pipeline> {
        if self.steps.is_empty() {
            return Err(ConfigurationError::EmptyPipeline { pipeline: self.name });
        }

        if let Some(step) = self.first_duplicate() {
            return Err(ConfigurationError::DuplicateStep {
                pipeline: self.name,
                step,
            });
        }

        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
            post_steps: self.post_steps,
            batch_steps: self.batch_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendResult;
    use crate::models::StepOutput;
    use async_trait::async_trait;

    struct Named(&'static str, &'static [&'static str]);

    #[async_trait]
    impl PipelineStep for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn required_constants(&self) -> &[&'static str] {
            self.1
        }

        async fn execute(&self, _ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
            Ok(StepOutcome::completed(StepOutput::default()))
        }
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let err = Pipeline::builder("empty").build().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::EmptyPipeline {
                pipeline: "empty".to_string()
            }
        );
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let err = Pipeline::builder("dup")
            .step(Named("clip", &[]))
            .post_step(Named("clip", &[]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateStep { ref step, .. } if step == "clip"));
    }

    #[test]
    fn required_constants_are_collected() {
        let pipeline = Pipeline::builder("veg")
            .step(Named("select", &["source_points", "id_field"]))
            .post_step(Named("export", &["spreadsheet_dir", "id_field"]))
            .build()
            .unwrap();

        assert_eq!(
            pipeline.required_constants().into_iter().collect::<Vec<_>>(),
            vec!["id_field", "source_points", "spreadsheet_dir"]
        );
        assert_eq!(pipeline.step_names(), vec!["select", "export"]);
    }

    #[test]
    fn error_policy_deserializes_snake_case() {
        let policy: ErrorPolicy = serde_json::from_str("\"abort_batch\"").unwrap();
        assert_eq!(policy, ErrorPolicy::AbortBatch);
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::ContinueWithNextItem);
    }
}
