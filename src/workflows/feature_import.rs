//! Prepare field-mapped features for import into the invasive species
//! database.
//!
//! Points and lines are buffered by their per-feature buffer distance so
//! that every input becomes a polygon layer. All inputs are then merged into
//! one output, repaired, and given a GlobalID plus gross and net infested
//! area fields.

use super::common::{description_from, AddAndCalculate, Describe};
use super::{require_section, Backends};
use crate::backend::{BufferDistance, BufferParams, DataType, FieldComputation};
use crate::config::{ConfigResult, FeatureImportConfig, GeobatchConfig};
use crate::constants::{constant_keys as keys, fields, steps, SQUARE_METERS_PER_ACRE};
use crate::error::{BackendError, BackendResult, Result};
use crate::models::{ArtifactRef, BatchReport, FieldSpec, FieldValue, WorkItem};
use crate::pipeline::{
    BatchContext, BatchStep, Pipeline, PipelineStep, StepContext, StepOutcome, WorkflowConstants,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

const PIPELINE_NAME: &str = "feature_import";

/// Split a semicolon-delimited input list, dropping quotes and blanks
pub fn parse_input_list(inputs: &str) -> Vec<String> {
    inputs
        .split(';')
        .map(|input| input.trim().trim_matches(|c: char| c == '\'' || c == '"').trim())
        .filter(|input| !input.is_empty())
        .map(str::to_string)
        .collect()
}

/// Output shapefile path: `.shp` is appended when missing, and relative
/// paths are taken relative to the first input's directory.
pub fn resolve_output(output: &str, inputs: &[String]) -> PathBuf {
    let mut output = output.trim().to_string();
    if !output.to_ascii_lowercase().ends_with(".shp") {
        output.push_str(".shp");
    }
    let output = PathBuf::from(output);
    if output.is_absolute() {
        return output;
    }
    inputs
        .first()
        .and_then(|first| Path::new(first).parent())
        .map(|dir| dir.join(&output))
        .unwrap_or(output)
}

/// `{XXXXXXXX-XXXX-4XXX-XXXX-XXXXXXXXXXXX}`
pub fn new_global_id() -> String {
    format!("{{{}}}", Uuid::new_v4().to_string().to_uppercase())
}

/// Buffer point and line inputs into run-scoped scratch; polygons pass.
struct BufferLinearFeature;

#[async_trait]
impl PipelineStep for BufferLinearFeature {
    fn name(&self) -> &str {
        steps::BUFFER_LINEAR_FEATURE
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::BUFFER_DISTANCE_FIELD]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let description = description_from(ctx.output_of(steps::DESCRIBE_FEATURE), steps::DESCRIBE_FEATURE)?;
        let shape_type = description.shape_type.ok_or_else(|| {
            BackendError::InvalidInput(format!("{} has no shape type", ctx.item.id))
        })?;
        if !shape_type.needs_buffer() {
            return Ok(StepOutcome::skipped(format!("{shape_type} features are merged as they are")));
        }

        let distance_field = ctx.constant(keys::BUFFER_DISTANCE_FIELD)?;
        let buffered = ctx.run_scratch_dataset("temp");
        info!(item_id = %ctx.item.id, shape_type = %shape_type, output = %buffered, "Buffering features");
        ctx.geo
            .buffer(
                &ctx.item.location(),
                &buffered,
                &BufferParams::new(BufferDistance::Field(distance_field.to_string())),
            )
            .await?;
        Ok(StepOutcome::artifact(ArtifactRef::Dataset(buffered)))
    }
}

/// Polygon inputs as given, then buffered inputs, merged into the output.
struct MergeFeatures;

#[async_trait]
impl BatchStep for MergeFeatures {
    fn name(&self) -> &str {
        steps::MERGE_FEATURES
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::OUTPUT]
    }

    async fn execute(&self, ctx: &mut BatchContext<'_>) -> BackendResult<StepOutcome> {
        let output = ctx.constant(keys::OUTPUT)?;
        let mut polygons = Vec::new();
        let mut buffered = Vec::new();
        for report in &ctx.items {
            match report
                .output_of(steps::BUFFER_LINEAR_FEATURE)
                .and_then(|step_output| step_output.primary())
                .and_then(ArtifactRef::as_dataset)
            {
                Some(dataset) => buffered.push(dataset.to_string()),
                None => polygons.push(report.item.location()),
            }
        }
        let inputs: Vec<String> = polygons.into_iter().chain(buffered).collect();
        if inputs.is_empty() {
            return Err(BackendError::InvalidInput("no features to merge".to_string()));
        }

        let artifact = ctx.claim_dataset(output).await?;
        info!(inputs = inputs.len(), output = %output, "Merging features");
        ctx.geo.merge(&inputs, output).await?;
        Ok(StepOutcome::artifact(artifact))
    }
}

struct RepairMergedGeometry;

#[async_trait]
impl BatchStep for RepairMergedGeometry {
    fn name(&self) -> &str {
        steps::REPAIR_GEOMETRY
    }

    async fn execute(&self, ctx: &mut BatchContext<'_>) -> BackendResult<StepOutcome> {
        let merged = ctx.dataset_from(steps::MERGE_FEATURES)?;
        info!(dataset = %merged, "Repairing geometry");
        ctx.geo.repair_geometry(&merged, true).await?;
        Ok(StepOutcome::artifact(ArtifactRef::Dataset(merged)))
    }
}

fn gross_area() -> FieldComputation {
    FieldComputation::new("shape area in acres", |record| {
        record
            .number(fields::SHAPE_AREA)
            .map(|square_meters| FieldValue::Double(square_meters / SQUARE_METERS_PER_ACRE))
            .ok_or_else(|| "feature has no area".to_string())
    })
}

fn net_area(cover_field: String) -> FieldComputation {
    FieldComputation::new(format!("{} * {cover_field}", fields::GROSS_INFECTED_AREA), move |record| {
        let gross = record
            .number(fields::GROSS_INFECTED_AREA)
            .ok_or_else(|| format!("{} is not set", fields::GROSS_INFECTED_AREA))?;
        let cover = record
            .number(&cover_field)
            .ok_or_else(|| format!("{cover_field} is not set"))?;
        Ok(FieldValue::Double(gross * cover))
    })
}

pub fn pipeline(section: &FeatureImportConfig) -> ConfigResult<Pipeline> {
    Pipeline::builder(PIPELINE_NAME)
        .step(Describe::new(steps::DESCRIBE_FEATURE, Some(DataType::FeatureClass)))
        .step(BufferLinearFeature)
        .batch_step(MergeFeatures)
        .batch_step(RepairMergedGeometry)
        .batch_step(AddAndCalculate::new(
            steps::ASSIGN_GLOBAL_IDS,
            steps::MERGE_FEATURES,
            FieldSpec::text(fields::GLOBAL_ID, 50).non_nullable(),
            FieldComputation::new("new GUID", |_| Ok(FieldValue::Text(new_global_id()))),
        ))
        .batch_step(AddAndCalculate::new(
            steps::COMPUTE_GROSS_AREA,
            steps::MERGE_FEATURES,
            FieldSpec::double(fields::GROSS_INFECTED_AREA).non_nullable(),
            gross_area(),
        ))
        .batch_step(
            AddAndCalculate::new(
                steps::COMPUTE_NET_AREA,
                steps::MERGE_FEATURES,
                FieldSpec::double(fields::NET_INFECTED_AREA).non_nullable(),
                net_area(section.cover_field.clone()),
            )
            .requiring(&[keys::COVER_FIELD]),
        )
        .build()
}

pub fn constants(config: &GeobatchConfig, section: &FeatureImportConfig, output: &Path) -> WorkflowConstants {
    WorkflowConstants::new()
        .with(keys::SCRATCH_WORKSPACE, super::path_string(&config.workspace.scratch_dir()))
        .with(keys::OUTPUT, super::path_string(output))
        .with(keys::BUFFER_DISTANCE_FIELD, section.buffer_distance_field.as_str())
        .with(keys::COVER_FIELD, section.cover_field.as_str())
}

pub fn work_items(inputs: &[String]) -> Vec<WorkItem> {
    inputs
        .iter()
        .map(|input| {
            let name = Path::new(input)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.clone());
            WorkItem::new(input.as_str()).with_name(name)
        })
        .collect()
}

/// Merge the listed inputs into one import-ready polygon layer.
pub async fn run(config: &GeobatchConfig, backends: &Backends) -> Result<BatchReport> {
    let section = require_section(&config.feature_import, PIPELINE_NAME, FeatureImportConfig::validate)?;
    let inputs = parse_input_list(&section.inputs);
    let output = resolve_output(&section.output, &inputs);
    info!(inputs = inputs.len(), output = %output.display(), "Preparing features for import");

    let pipeline = pipeline(section)?;
    let constants = constants(config, section, &output);
    backends
        .runner(config, config.overwrite_for(section.overwrite_output))
        .run(&pipeline, &constants, futures::stream::iter(work_items(&inputs)))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_lists_lose_quotes_and_blanks() {
        assert_eq!(
            parse_input_list("'C:/data/a.shp';C:/data/b.shp; ;\"c.shp\""),
            vec!["C:/data/a.shp", "C:/data/b.shp", "c.shp"]
        );
    }

    #[test]
    fn relative_output_lands_next_to_first_input() {
        let inputs = vec!["/data/chis/weeds.shp".to_string(), "/other/lines.shp".to_string()];
        assert_eq!(resolve_output("merged", &inputs), PathBuf::from("/data/chis/merged.shp"));
        assert_eq!(resolve_output("/out/merged.shp", &inputs), PathBuf::from("/out/merged.shp"));
    }

    #[test]
    fn global_ids_are_braced_uppercase_uuids() {
        let id = new_global_id();
        assert_eq!(id.len(), 38);
        assert!(id.starts_with('{') && id.ends_with('}'));
        assert_eq!(id, id.to_uppercase());
        assert!(Uuid::parse_str(&id[1..37]).is_ok());
    }

    #[test]
    fn net_area_multiplies_gross_by_cover() {
        use crate::models::Record;
        let record = Record::new(1)
            .with_value(fields::GROSS_INFECTED_AREA, 2.0)
            .with_value(fields::PERCENT_COVER, 0.25);
        assert_eq!(
            net_area(fields::PERCENT_COVER.to_string()).evaluate(&record),
            Ok(FieldValue::Double(0.5))
        );
        let acres = gross_area().evaluate(&Record::new(2).with_area(SQUARE_METERS_PER_ACRE));
        assert_eq!(acres, Ok(FieldValue::Double(1.0)));
    }
}
