//! Slope rasters for every raster in a folder.

use super::common::{description_from, Describe};
use super::{path_string, require_directory, require_section, Backends};
use crate::backend::{DataType, SlopeParams};
use crate::config::{BatchSlopeConfig, ConfigResult, GeobatchConfig};
use crate::constants::{constant_keys as keys, steps};
use crate::error::{BackendResult, GeobatchError, Result};
use crate::models::BatchReport;
use crate::pipeline::{Pipeline, PipelineStep, StepContext, StepOutcome, WorkflowConstants};
use crate::sources::{by_data_type, DirectoryWalker};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

const PIPELINE_NAME: &str = "batch_slope";

struct DeriveSlope {
    params: SlopeParams,
}

#[async_trait]
impl PipelineStep for DeriveSlope {
    fn name(&self) -> &str {
        steps::DERIVE_SLOPE
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::OUTPUT_WORKSPACE, keys::OUTPUT_SUFFIX]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let description = description_from(ctx.output_of(steps::DESCRIBE_RASTER), steps::DESCRIBE_RASTER)?;
        let workspace = ctx.constant(keys::OUTPUT_WORKSPACE)?;
        let suffix = ctx.constant(keys::OUTPUT_SUFFIX)?;
        let output = path_string(&Path::new(workspace).join(format!("{}{suffix}", description.name)));

        let artifact = ctx.claim_dataset(output.clone()).await?;
        info!(raster = %description.name, output = %output, "Calculating slope");
        ctx.geo.slope(&ctx.item.location(), &output, &self.params).await?;
        Ok(StepOutcome::artifact(artifact))
    }
}

pub fn pipeline(section: &BatchSlopeConfig) -> ConfigResult<Pipeline> {
    Pipeline::builder(PIPELINE_NAME)
        .step(Describe::new(steps::DESCRIBE_RASTER, Some(DataType::Raster)))
        .step(DeriveSlope {
            params: SlopeParams {
                measurement: section.output_measurement,
                z_factor: section.z_factor,
            },
        })
        .build()
}

pub fn constants(section: &BatchSlopeConfig) -> WorkflowConstants {
    let output_workspace = section
        .output_workspace
        .clone()
        .unwrap_or_else(|| section.raster_dir.clone());
    WorkflowConstants::new()
        .with(keys::OUTPUT_WORKSPACE, path_string(&output_workspace))
        .with(keys::OUTPUT_SUFFIX, section.output_suffix.as_str())
}

/// Derive slope for each raster directly inside the raster folder.
///
/// The extension license is held for the duration of the run and returned
/// whatever the outcome. Existing outputs are kept unless the section
/// enables overwriting.
pub async fn run(config: &GeobatchConfig, backends: &Backends) -> Result<BatchReport> {
    let section = require_section(&config.batch_slope, PIPELINE_NAME, BatchSlopeConfig::validate)?;
    require_directory(backends.fs.as_ref(), &section.raster_dir).await?;
    let pipeline = pipeline(section)?;
    let constants = constants(section);

    backends
        .geo
        .check_out_extension(&section.extension)
        .await
        .map_err(|source| GeobatchError::backend("check_out_extension", source))?;
    info!(extension = %section.extension, "Extension checked out");

    let rasters = DirectoryWalker::new(&section.raster_dir)
        .recursive(false)
        .filter(by_data_type(DataType::Raster));
    let result = backends
        .runner(config, section.overwrite_output.unwrap_or(false))
        .run(&pipeline, &constants, rasters.into_stream())
        .await;

    if let Err(e) = backends.geo.check_in_extension(&section.extension).await {
        warn!(extension = %section.extension, error = %e, "Unable to check in extension");
    }
    result
}
