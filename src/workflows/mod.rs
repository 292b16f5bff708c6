//! # Workflows
//!
//! Concrete pipelines built from configuration. Each workflow validates its
//! configuration section, builds its [`Pipeline`](crate::pipeline::Pipeline)
//! and its input stream, and hands both to a
//! [`PipelineRunner`](crate::pipeline::PipelineRunner).
//!
//! | Workflow | Items | Per-item steps | Second pass / batch |
//! |---|---|---|---|
//! | [`veg_summary`] | point records | select, buffer, clip, statistics, add field | percentages, spreadsheet |
//! | [`survey_append`] | point and track inputs | survey fields, watershed join, append | |
//! | [`photo_transfer`] | `*.jpg` files | rename, copy | |
//! | [`feature_import`] | listed feature classes | describe, buffer | merge, repair, ids, areas |
//! | [`batch_slope`] | rasters in a folder | describe, slope | |
//! | [`zone_sort`] | feature classes in a tree | describe, copy to zone | |

pub mod batch_slope;
pub mod common;
pub mod feature_import;
pub mod photo_transfer;
pub mod survey_append;
pub mod veg_summary;
pub mod zone_sort;

use crate::backend::{FileSystemBackend, GeoprocessingBackend};
use crate::config::{ConfigResult, ConfigurationError, GeobatchConfig};
use crate::error::{GeobatchError, Result};
use crate::pipeline::{PipelineRunner, RunSettings};
use std::path::Path;
use std::sync::Arc;

/// The capabilities a workflow runs against.
#[derive(Clone)]
pub struct Backends {
    pub geo: Arc<dyn GeoprocessingBackend>,
    pub fs: Arc<dyn FileSystemBackend>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

impl Backends {
    pub fn new(geo: Arc<dyn GeoprocessingBackend>, fs: Arc<dyn FileSystemBackend>) -> Self {
        Self { geo, fs }
    }

    /// Runner configured from the workspace and runner sections
    pub fn runner(&self, config: &GeobatchConfig, overwrite_output: bool) -> PipelineRunner {
        let settings = RunSettings::default()
            .with_overwrite(overwrite_output)
            .with_error_policy(config.runner.error_policy)
            .with_scratch_workspace(config.workspace.scratch_dir());
        PipelineRunner::new(Arc::clone(&self.geo), Arc::clone(&self.fs), settings)
    }
}

/// A workflow section that must be present and valid
pub fn require_section<'a, T>(
    section: &'a Option<T>,
    name: &str,
    validate: impl FnOnce(&T) -> ConfigResult<()>,
) -> ConfigResult<&'a T> {
    let section = section
        .as_ref()
        .ok_or_else(|| ConfigurationError::missing_section(name))?;
    validate(section)?;
    Ok(section)
}

/// Fail the run when an input directory is missing
pub async fn require_directory(fs: &dyn FileSystemBackend, dir: &Path) -> Result<()> {
    let present = fs
        .is_dir(dir)
        .await
        .map_err(|source| GeobatchError::backend("is_dir", source))?;
    if !present {
        return Err(GeobatchError::MissingInput(dir.display().to_string()));
    }
    Ok(())
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
