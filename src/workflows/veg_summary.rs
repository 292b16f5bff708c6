//! Vegetation composition around survey points.
//!
//! For every point in the point layer: select it, buffer it, clip the
//! vegetation map to the buffer and sum the clipped area per vegetation
//! class. Once the class table is complete a second pass computes each
//! class's share of the buffer area and exports the table as a spreadsheet.

use super::common::{AddFields, Target};
use super::{path_string, require_section, Backends};
use crate::backend::{
    AttributeFilter, BufferDistance, BufferParams, Dissolve, FieldComputation, LinearDistance,
    StatisticSpec,
};
use crate::config::{GeobatchConfig, VegSummaryConfig};
use crate::constants::{constant_keys as keys, steps};
use crate::error::{BackendError, BackendResult, Result};
use crate::models::{ArtifactRef, BatchReport, FieldSpec, FieldValue, StepOutput};
use crate::pipeline::{
    percent_shares, require_backend, Pipeline, PipelineStep, StepContext, StepOutcome,
    WorkflowConstants,
};
use crate::sources::record_source;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

const PIPELINE_NAME: &str = "veg_summary";

struct SelectPoint {
    keep: bool,
}

#[async_trait]
impl PipelineStep for SelectPoint {
    fn name(&self) -> &str {
        steps::SELECT_POINT
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::SOURCE_POINTS, keys::ID_FIELD]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let points = ctx.constant(keys::SOURCE_POINTS)?;
        let id_field = ctx.constant(keys::ID_FIELD)?;
        let output = ctx.workspace_path(&ctx.output_stem());

        let artifact = ctx.claim_dataset(output.clone()).await?;
        let filter = AttributeFilter::equals(id_field, ctx.item.id.as_str());
        info!(item_id = %ctx.item.id, filter = %filter.where_clause(), "Selecting point");
        ctx.geo.select(points, &output, &filter).await?;

        if !self.keep {
            ctx.register_scratch(artifact.clone());
        }
        Ok(StepOutcome::artifact(artifact))
    }
}

struct BufferPoint {
    keep: bool,
}

#[async_trait]
impl PipelineStep for BufferPoint {
    fn name(&self) -> &str {
        steps::BUFFER_POINT
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::BUFFER_DISTANCE, keys::ID_FIELD]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let distance: LinearDistance = ctx
            .constant(keys::BUFFER_DISTANCE)?
            .parse()
            .map_err(BackendError::InvalidInput)?;
        let id_field = ctx.constant(keys::ID_FIELD)?;
        let selected = ctx.dataset_from(steps::SELECT_POINT)?;
        let output = ctx.workspace_path(&format!("{}_buff", ctx.output_stem()));

        let artifact = ctx.claim_dataset(output.clone()).await?;
        let params = BufferParams::new(BufferDistance::Linear(distance))
            .dissolve(Dissolve::List(vec![id_field.to_string()]));
        info!(item_id = %ctx.item.id, distance = %distance, "Buffering point");
        ctx.geo.buffer(&selected, &output, &params).await?;

        if !self.keep {
            ctx.register_scratch(artifact.clone());
        }
        Ok(StepOutcome::artifact(artifact))
    }
}

struct ClipVegetation {
    keep: bool,
}

#[async_trait]
impl PipelineStep for ClipVegetation {
    fn name(&self) -> &str {
        steps::CLIP_VEGETATION
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::VEGETATION]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let vegetation = ctx.constant(keys::VEGETATION)?;
        let buffer = ctx.dataset_from(steps::BUFFER_POINT)?;
        let output = ctx.workspace_path(&format!("{}_clip", ctx.output_stem()));

        let artifact = ctx.claim_dataset(output.clone()).await?;
        info!(item_id = %ctx.item.id, "Clipping vegetation to buffer");
        ctx.geo.clip(vegetation, &buffer, &output).await?;

        if !self.keep {
            ctx.register_scratch(artifact.clone());
        }
        Ok(StepOutcome::artifact(artifact))
    }
}

struct SummarizeVegetation;

#[async_trait]
impl PipelineStep for SummarizeVegetation {
    fn name(&self) -> &str {
        steps::SUMMARIZE_VEGETATION
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::CASE_FIELD, keys::AREA_FIELD]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let case_field = ctx.constant(keys::CASE_FIELD)?;
        let area_field = ctx.constant(keys::AREA_FIELD)?;
        let clipped = ctx.dataset_from(steps::CLIP_VEGETATION)?;
        let output = ctx.workspace_path(&format!("{}_stats", ctx.output_stem()));

        let artifact = ctx.claim_dataset(output.clone()).await?;
        info!(item_id = %ctx.item.id, case_field = %case_field, "Generating area statistics");
        ctx.geo
            .summary_statistics(&clipped, &output, &[StatisticSpec::sum(area_field)], case_field)
            .await?;
        Ok(StepOutcome::artifact(artifact))
    }
}

/// Second pass: each class's share of the item's total area. The whole
/// statistics table is read before any share is written.
struct ComputePercentShares;

#[async_trait]
impl PipelineStep for ComputePercentShares {
    fn name(&self) -> &str {
        steps::COMPUTE_PERCENT_SHARES
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::AREA_FIELD, keys::PERCENT_FIELD]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let area_field = ctx.constant(keys::AREA_FIELD)?;
        let percent_field = ctx.constant(keys::PERCENT_FIELD)?;
        let stats = ctx.dataset_from(steps::SUMMARIZE_VEGETATION)?;
        let sum_field = StatisticSpec::sum(area_field).output_field();

        let cells: Vec<(i64, Option<f64>)> = ctx
            .geo
            .search_cursor(&stats, &[sum_field.clone()])
            .await?
            .map(|record| (record.object_id, record.number(&sum_field)))
            .collect()
            .await;
        // Every class row must carry a sum.
        let rows = cells
            .into_iter()
            .map(|(object_id, area)| {
                area.map(|area| (object_id, area)).ok_or_else(|| {
                    BackendError::InvalidInput(format!(
                        "{sum_field} is null for row {object_id} of {stats}"
                    ))
                })
            })
            .collect::<BackendResult<Vec<(i64, f64)>>>()?;

        let areas: Vec<f64> = rows.iter().map(|(_, area)| *area).collect();
        let total: f64 = areas.iter().sum();
        let shares: HashMap<i64, f64> = rows
            .iter()
            .map(|(object_id, _)| *object_id)
            .zip(percent_shares(&areas))
            .collect();

        info!(item_id = %ctx.item.id, total_area = total, classes = rows.len(), "Calculating percentages");
        let computation = FieldComputation::new(format!("share of {sum_field}"), move |record| {
            shares
                .get(&record.object_id)
                .map(|share| FieldValue::Double(*share))
                .ok_or_else(|| format!("record {} was not in the totals pass", record.object_id))
        });
        ctx.geo.calculate_field(&stats, percent_field, &computation).await?;

        Ok(StepOutcome::completed(
            StepOutput::artifact(ArtifactRef::Dataset(stats)).with_data(json!({
                "total_area": total,
                "classes": rows.len(),
            })),
        ))
    }
}

struct ExportSpreadsheet;

#[async_trait]
impl PipelineStep for ExportSpreadsheet {
    fn name(&self) -> &str {
        steps::EXPORT_SPREADSHEET
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::SPREADSHEET_DIR]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let directory = ctx.constant(keys::SPREADSHEET_DIR)?;
        let stats = ctx.dataset_from(steps::SUMMARIZE_VEGETATION)?;
        let path = Path::new(directory).join(format!("{}.xls", ctx.output_stem()));

        let artifact = ctx.claim_file(path.clone()).await?;
        info!(item_id = %ctx.item.id, path = %path.display(), "Exporting table to spreadsheet");
        ctx.geo.table_to_spreadsheet(&stats, &path).await?;
        Ok(StepOutcome::artifact(artifact))
    }
}

pub fn constants(config: &GeobatchConfig, section: &VegSummaryConfig) -> WorkflowConstants {
    WorkflowConstants::new()
        .with(keys::WORKSPACE, path_string(&config.workspace.root))
        .with(keys::SCRATCH_WORKSPACE, path_string(&config.workspace.scratch_dir()))
        .with(keys::SOURCE_POINTS, section.points.as_str())
        .with(keys::ID_FIELD, section.id_field.as_str())
        .with(keys::VEGETATION, section.vegetation.as_str())
        .with(keys::BUFFER_DISTANCE, section.buffer_distance.as_str())
        .with(keys::CASE_FIELD, section.case_field.as_str())
        .with(keys::AREA_FIELD, section.area_field.as_str())
        .with(keys::PERCENT_FIELD, section.percent_field.as_str())
        .with(keys::SPREADSHEET_DIR, path_string(&section.spreadsheet_dir))
}

pub fn pipeline(section: &VegSummaryConfig) -> crate::config::ConfigResult<Pipeline> {
    let keep = section.keep_intermediates;
    Pipeline::builder(PIPELINE_NAME)
        .step(SelectPoint { keep })
        .step(BufferPoint { keep })
        .step(ClipVegetation { keep })
        .step(SummarizeVegetation)
        .step(AddFields::new(
            steps::ADD_PERCENT_FIELD,
            Target::OutputOf(steps::SUMMARIZE_VEGETATION),
            vec![FieldSpec::double(section.percent_field.as_str()).with_precision(9)],
        ))
        .post_step(ComputePercentShares)
        .post_step(ExportSpreadsheet)
        .build()
}

/// Summarize vegetation around every point of the configured point layer.
pub async fn run(config: &GeobatchConfig, backends: &Backends) -> Result<BatchReport> {
    let section = require_section(&config.veg_summary, PIPELINE_NAME, VegSummaryConfig::validate)?;
    let pipeline = pipeline(section)?;
    let constants = constants(config, section);

    let items = require_backend(
        "search_cursor",
        record_source(backends.geo.as_ref(), &section.points, &section.id_field).await,
    )?;

    backends
        .runner(config, config.overwrite_for(section.overwrite_output))
        .run(&pipeline, &constants, items)
        .await
}
