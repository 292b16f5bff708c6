//! Step traits and the context handed to each step execution.

use super::claims::OutputClaims;
use super::runner::RunSettings;
use super::scratch::{scratch_name, ScratchSpace};
use crate::backend::{FileSystemBackend, GeoprocessingBackend};
use crate::error::{BackendError, BackendResult};
use crate::models::{ArtifactRef, ItemReport, StepOutput, StepResult, StepStatus, WorkItem};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What a step reports back to the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(StepOutput),
    /// The step does not apply to this item; the item continues
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn completed(output: StepOutput) -> Self {
        Self::Completed(output)
    }

    pub fn artifact(artifact: ArtifactRef) -> Self {
        Self::Completed(StepOutput::artifact(artifact))
    }

    pub fn skipped<S: Into<String>>(reason: S) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Workflow-level constants (workspace paths, field names, distances) shared
/// by every step of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowConstants {
    values: BTreeMap<String, String>,
}

impl WorkflowConstants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value for `key`, treating blank values as missing
    pub fn require(&self, key: &str) -> BackendResult<&str> {
        self.get(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| BackendError::InvalidInput(format!("constant '{key}' is not set")))
    }

    /// Keys from `required` that are absent or blank
    pub fn missing<'k>(&self, required: impl IntoIterator<Item = &'k str>) -> Vec<&'k str> {
        required
            .into_iter()
            .filter(|key| self.require(key).is_err())
            .collect()
    }
}

/// A unit of work applied to one work item.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    /// Constants that must be set before the run starts
    fn required_constants(&self) -> &[&'static str] {
        &[]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome>;
}

/// An aggregate operation run once over every item that succeeded.
#[async_trait]
pub trait BatchStep: Send + Sync {
    fn name(&self) -> &str;

    fn required_constants(&self) -> &[&'static str] {
        &[]
    }

    async fn execute(&self, ctx: &mut BatchContext<'_>) -> BackendResult<StepOutcome>;
}

/// Everything a step may touch while processing one item.
pub struct StepContext<'a> {
    pub item: &'a WorkItem,
    /// 1-based position of the executing step
    pub step_index: usize,
    pub constants: &'a WorkflowConstants,
    pub geo: &'a dyn GeoprocessingBackend,
    pub fs: &'a dyn FileSystemBackend,
    pub(crate) prior: &'a [StepResult],
    pub(crate) item_scratch: &'a ScratchSpace,
    pub(crate) run_scratch: &'a ScratchSpace,
    pub(crate) claims: &'a mut OutputClaims,
    pub(crate) settings: &'a RunSettings,
}

impl<'a> StepContext<'a> {
    pub fn constant(&self, key: &str) -> BackendResult<&'a str> {
        self.constants.require(key)
    }

    pub fn overwrite_output(&self) -> bool {
        self.settings.overwrite_output
    }

    /// Output of an earlier completed step of this item
    pub fn output_of(&self, step_name: &str) -> Option<&'a StepOutput> {
        completed_output(self.prior, step_name)
    }

    /// Primary dataset produced by an earlier step of this item
    pub fn dataset_from(&self, step_name: &str) -> BackendResult<String> {
        primary_dataset(self.output_of(step_name), step_name)
    }

    /// `<workspace>/<name>`; the workspace constant is optional
    pub fn workspace_path(&self, name: &str) -> String {
        join_workspace(self.constants, name)
    }

    /// Output name stem unique to this item
    pub fn output_stem(&self) -> String {
        sanitize(&self.item.id)
    }

    pub async fn claim_dataset<S: Into<String>>(&mut self, location: S) -> BackendResult<ArtifactRef> {
        self.claims
            .claim_dataset(self.geo, self.settings.overwrite_output, &self.item.id, location.into())
            .await
    }

    pub async fn claim_file<P: Into<PathBuf>>(&mut self, path: P) -> BackendResult<ArtifactRef> {
        self.claims
            .claim_file(self.fs, self.settings.overwrite_output, &self.item.id, path.into())
            .await
    }

    /// Delete `artifact` once this item's steps finish
    pub fn register_scratch(&self, artifact: ArtifactRef) {
        self.item_scratch.register(artifact);
    }

    /// Delete `artifact` once the whole run finishes
    pub fn register_run_scratch(&self, artifact: ArtifactRef) {
        self.run_scratch.register(artifact);
    }

    /// Fresh dataset name in the scratch workspace, deleted with this item
    pub fn scratch_dataset(&self, prefix: &str) -> String {
        let name = scratch_name(prefix, &scratch_workspace(self.constants, self.settings));
        self.item_scratch.register(ArtifactRef::dataset(name.clone()));
        name
    }

    /// Fresh dataset name in the scratch workspace, deleted after the run
    pub fn run_scratch_dataset(&self, prefix: &str) -> String {
        let name = scratch_name(prefix, &scratch_workspace(self.constants, self.settings));
        self.run_scratch.register(ArtifactRef::dataset(name.clone()));
        name
    }
}

/// Everything a batch step may touch.
pub struct BatchContext<'a> {
    /// Reports of the items that succeeded, in enumeration order
    pub items: Vec<&'a ItemReport>,
    pub step_index: usize,
    pub constants: &'a WorkflowConstants,
    pub geo: &'a dyn GeoprocessingBackend,
    pub fs: &'a dyn FileSystemBackend,
    pub(crate) prior: &'a [StepResult],
    pub(crate) run_scratch: &'a ScratchSpace,
    pub(crate) claims: &'a mut OutputClaims,
    pub(crate) settings: &'a RunSettings,
    pub(crate) owner: &'a str,
}

impl<'a> BatchContext<'a> {
    pub fn constant(&self, key: &str) -> BackendResult<&'a str> {
        self.constants.require(key)
    }

    pub fn overwrite_output(&self) -> bool {
        self.settings.overwrite_output
    }

    /// Output of an earlier completed batch step
    pub fn output_of(&self, step_name: &str) -> Option<&'a StepOutput> {
        completed_output(self.prior, step_name)
    }

    pub fn dataset_from(&self, step_name: &str) -> BackendResult<String> {
        primary_dataset(self.output_of(step_name), step_name)
    }

    /// Primary datasets each succeeded item produced in `step_name`
    pub fn item_datasets(&self, step_name: &str) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|report| report.output_of(step_name))
            .filter_map(|output| output.primary())
            .filter_map(|artifact| artifact.as_dataset().map(str::to_string))
            .collect()
    }

    pub fn workspace_path(&self, name: &str) -> String {
        join_workspace(self.constants, name)
    }

    pub async fn claim_dataset<S: Into<String>>(&mut self, location: S) -> BackendResult<ArtifactRef> {
        self.claims
            .claim_dataset(self.geo, self.settings.overwrite_output, self.owner, location.into())
            .await
    }

    pub fn register_run_scratch(&self, artifact: ArtifactRef) {
        self.run_scratch.register(artifact);
    }
}

fn completed_output<'a>(results: &'a [StepResult], step_name: &str) -> Option<&'a StepOutput> {
    results
        .iter()
        .find(|result| result.step_name == step_name && result.status == StepStatus::Completed)
        .map(|result| &result.output)
}

fn primary_dataset(output: Option<&StepOutput>, step_name: &str) -> BackendResult<String> {
    output
        .and_then(StepOutput::primary)
        .and_then(ArtifactRef::as_dataset)
        .map(str::to_string)
        .ok_or_else(|| BackendError::InvalidInput(format!("step '{step_name}' produced no dataset")))
}

fn join_workspace(constants: &WorkflowConstants, name: &str) -> String {
    match constants.get(crate::constants::constant_keys::WORKSPACE) {
        Some(workspace) if !workspace.trim().is_empty() => {
            Path::new(workspace).join(name).to_string_lossy().into_owned()
        }
        _ => name.to_string(),
    }
}

fn scratch_workspace(constants: &WorkflowConstants, settings: &RunSettings) -> PathBuf {
    constants
        .get(crate::constants::constant_keys::SCRATCH_WORKSPACE)
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.scratch_workspace.clone())
}

/// Replace path separators and punctuation so an item id can be used in a
/// dataset name.
pub fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_constants_count_as_missing() {
        let constants = WorkflowConstants::new()
            .with("workspace", "veg.gdb")
            .with("case_field", " ");

        assert_eq!(constants.require("workspace").unwrap(), "veg.gdb");
        assert!(constants.require("case_field").is_err());
        assert_eq!(
            constants.missing(["workspace", "case_field", "vegetation"]),
            vec!["case_field", "vegetation"]
        );
    }

    #[test]
    fn sanitized_ids_are_dataset_safe() {
        assert_eq!(sanitize("a/roads.shp"), "a_roads_shp");
        assert_eq!(sanitize("SBI_12"), "SBI_12");
    }

    #[test]
    fn workspace_join_is_optional() {
        let with = WorkflowConstants::new().with("workspace", "out");
        assert_eq!(join_workspace(&with, "x"), Path::new("out").join("x").to_string_lossy());
        assert_eq!(join_workspace(&WorkflowConstants::new(), "x"), "x");
    }
}
