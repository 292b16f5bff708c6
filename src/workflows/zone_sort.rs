//! Sort feature classes scattered through a directory tree into one folder
//! per coordinate system zone.

use super::common::{description_from, Describe};
use super::{path_string, require_directory, require_section, Backends};
use crate::backend::DataType;
use crate::config::{ConfigResult, GeobatchConfig, ZoneSortConfig, ZoneTarget};
use crate::constants::steps;
use crate::error::{BackendResult, Result};
use crate::models::{BatchReport, StepOutput};
use crate::pipeline::{Pipeline, PipelineStep, StepContext, StepOutcome, WorkflowConstants};
use crate::sources::{by_data_type, DirectoryWalker};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

const PIPELINE_NAME: &str = "zone_sort";

/// Copy the item into the directory of the zone matching its spatial
/// reference; items in no configured zone are skipped.
struct RouteToZone {
    zones: Vec<ZoneTarget>,
}

#[async_trait]
impl PipelineStep for RouteToZone {
    fn name(&self) -> &str {
        steps::ROUTE_TO_ZONE
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let description = description_from(ctx.output_of(steps::DESCRIBE_FEATURE), steps::DESCRIBE_FEATURE)?;
        let spatial_reference = description.spatial_reference.as_deref().unwrap_or("Unknown");
        let zone = match self
            .zones
            .iter()
            .find(|zone| zone.spatial_reference == spatial_reference)
        {
            Some(zone) => zone,
            None => {
                return Ok(StepOutcome::skipped(format!(
                    "no zone configured for spatial reference {spatial_reference}"
                )))
            }
        };

        let file_name = ctx
            .item
            .path
            .as_deref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| description.name.clone());
        let output = path_string(&zone.directory.join(file_name));

        let artifact = ctx.claim_dataset(output.clone()).await?;
        ctx.fs.create_dir_all(&zone.directory).await?;
        info!(item_id = %ctx.item.id, zone = %zone.spatial_reference, output = %output, "Copying to zone folder");
        ctx.geo.copy_features(&ctx.item.location(), &output).await?;

        Ok(StepOutcome::completed(
            StepOutput::artifact(artifact).with_data(json!({ "zone": zone.spatial_reference })),
        ))
    }
}

pub fn pipeline(section: &ZoneSortConfig) -> ConfigResult<Pipeline> {
    Pipeline::builder(PIPELINE_NAME)
        .step(Describe::new(steps::DESCRIBE_FEATURE, Some(DataType::FeatureClass)))
        .step(RouteToZone {
            zones: section.zones.clone(),
        })
        .build()
}

/// Walk the tree and copy each feature class into its zone folder.
/// Overwriting is off unless the section enables it.
pub async fn run(config: &GeobatchConfig, backends: &Backends) -> Result<BatchReport> {
    let section = require_section(&config.zone_sort, PIPELINE_NAME, ZoneSortConfig::validate)?;
    require_directory(backends.fs.as_ref(), &section.root).await?;
    let pipeline = pipeline(section)?;

    let features = DirectoryWalker::new(&section.root).filter(by_data_type(DataType::FeatureClass));
    backends
        .runner(config, section.overwrite_output.unwrap_or(false))
        .run(&pipeline, &WorkflowConstants::new(), features.into_stream())
        .await
}
