//! Steps shared by several workflows.

use crate::backend::{DataType, DatasetDescription, FieldComputation};
use crate::error::{BackendError, BackendResult};
use crate::models::{ArtifactRef, FieldSpec, StepOutput};
use crate::pipeline::{BatchContext, BatchStep, PipelineStep, StepContext, StepOutcome};
use async_trait::async_trait;
use tracing::{debug, info};

/// Dataset a field step works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The work item's own dataset
    Item,
    /// Primary dataset produced by an earlier step
    OutputOf(&'static str),
}

impl Target {
    fn resolve(&self, ctx: &StepContext<'_>) -> BackendResult<String> {
        match self {
            Self::Item => Ok(ctx.item.location()),
            Self::OutputOf(step) => ctx.dataset_from(step),
        }
    }
}

/// Add a set of fields to the target dataset.
#[derive(Debug)]
pub struct AddFields {
    name: &'static str,
    target: Target,
    fields: Vec<FieldSpec>,
}

impl AddFields {
    pub fn new(name: &'static str, target: Target, fields: Vec<FieldSpec>) -> Self {
        Self { name, target, fields }
    }
}

#[async_trait]
impl PipelineStep for AddFields {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let table = self.target.resolve(ctx)?;
        for field in &self.fields {
            debug!(table = %table, field = %field.name, field_type = %field.field_type, "Adding field");
            ctx.geo.add_field(&table, field).await?;
        }
        Ok(StepOutcome::artifact(ArtifactRef::Dataset(table)))
    }
}

/// Calculate fields of the target dataset from typed computations.
#[derive(Debug)]
pub struct CalculateFields {
    name: &'static str,
    target: Target,
    computations: Vec<(String, FieldComputation)>,
}

impl CalculateFields {
    pub fn new(name: &'static str, target: Target, computations: Vec<(String, FieldComputation)>) -> Self {
        Self {
            name,
            target,
            computations,
        }
    }
}

#[async_trait]
impl PipelineStep for CalculateFields {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let table = self.target.resolve(ctx)?;
        for (field, computation) in &self.computations {
            debug!(table = %table, field = %field, computation = %computation.description(), "Calculating field");
            ctx.geo.calculate_field(&table, field, computation).await?;
        }
        Ok(StepOutcome::artifact(ArtifactRef::Dataset(table)))
    }
}

/// Describe the work item's dataset, optionally insisting on its data type.
///
/// The description is stored as the step's data for later steps.
#[derive(Debug)]
pub struct Describe {
    name: &'static str,
    expect: Option<DataType>,
}

impl Describe {
    pub fn new(name: &'static str, expect: Option<DataType>) -> Self {
        Self { name, expect }
    }
}

#[async_trait]
impl PipelineStep for Describe {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let location = ctx.item.location();
        let description = ctx.geo.describe(&location).await?;
        if let Some(expected) = self.expect {
            if description.data_type != expected {
                return Err(BackendError::InvalidInput(format!(
                    "{location} is a {}, expected a {expected}",
                    description.data_type
                )));
            }
        }
        info!(
            item_id = %ctx.item.id,
            dataset = %description.name,
            shape_type = ?description.shape_type,
            spatial_reference = ?description.spatial_reference,
            "Described dataset"
        );
        let data = serde_json::to_value(&description)
            .map_err(|e| BackendError::operation_failed("describe", e))?;
        Ok(StepOutcome::completed(StepOutput::data(data)))
    }
}

/// Description recorded by an earlier [`Describe`] step
pub fn description_from(output: Option<&StepOutput>, step_name: &str) -> BackendResult<DatasetDescription> {
    let output = output
        .ok_or_else(|| BackendError::InvalidInput(format!("step '{step_name}' has no description")))?;
    serde_json::from_value(output.data.clone())
        .map_err(|e| BackendError::InvalidInput(format!("step '{step_name}' description: {e}")))
}

/// Add one field to the dataset an earlier batch step produced, then
/// calculate it.
#[derive(Debug)]
pub struct AddAndCalculate {
    name: &'static str,
    source_step: &'static str,
    field: FieldSpec,
    computation: FieldComputation,
    required: &'static [&'static str],
}

impl AddAndCalculate {
    pub fn new(
        name: &'static str,
        source_step: &'static str,
        field: FieldSpec,
        computation: FieldComputation,
    ) -> Self {
        Self {
            name,
            source_step,
            field,
            computation,
            required: &[],
        }
    }

    pub fn requiring(mut self, required: &'static [&'static str]) -> Self {
        self.required = required;
        self
    }
}

#[async_trait]
impl BatchStep for AddAndCalculate {
    fn name(&self) -> &str {
        self.name
    }

    fn required_constants(&self) -> &[&'static str] {
        self.required
    }

    async fn execute(&self, ctx: &mut BatchContext<'_>) -> BackendResult<StepOutcome> {
        let table = ctx.dataset_from(self.source_step)?;
        info!(table = %table, field = %self.field.name, "Adding and calculating field");
        ctx.geo.add_field(&table, &self.field).await?;
        ctx.geo
            .calculate_field(&table, &self.field.name, &self.computation)
            .await?;
        Ok(StepOutcome::artifact(ArtifactRef::Dataset(table)))
    }
}
