//! # Geobatch Configuration System
//!
//! Explicit, validated configuration for batch runs. Replaces the global
//! workspace/overwrite environment of desktop geoprocessing scripts with a
//! struct that is handed to the runner at construction.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use geobatch::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let overwrite = manager.config().workspace.overwrite_output;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::backend::{LinearDistance, SlopeMeasurement};
use crate::pipeline::ErrorPolicy;
use crate::workflows::photo_transfer::{PhotoNameTemplate, TransferMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use error::{require_non_blank, ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring geobatch.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GeobatchConfig {
    /// Workspace paths and overwrite policy
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pipeline runner behavior
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Survey metadata shared by survey append and photo transfer
    pub survey: Option<SurveyMetadata>,

    pub veg_summary: Option<VegSummaryConfig>,
    pub survey_append: Option<SurveyAppendConfig>,
    pub photo_transfer: Option<PhotoTransferConfig>,
    pub feature_import: Option<FeatureImportConfig>,
    pub batch_slope: Option<BatchSlopeConfig>,
    pub zone_sort: Option<ZoneSortConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    /// Directory (or geodatabase) that relative dataset names resolve against
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    /// Where scratch datasets go; defaults to `root`
    #[serde(default)]
    pub scratch: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub overwrite_output: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            scratch: None,
            overwrite_output: true,
        }
    }
}

impl WorkspaceConfig {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch.clone().unwrap_or_else(|| self.root.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Explicit filter directive; environment default when absent
    #[serde(default)]
    pub level: Option<String>,
    /// Directory for the JSON log file; no file output when absent
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurveyMetadata {
    pub gps_id: String,
    /// Free-form survey date, e.g. `3/2/2015` or `2015-03-02`
    pub survey_date: String,
    #[serde(default)]
    pub collection_dir: String,
    pub team_members: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VegSummaryConfig {
    pub points: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    pub vegetation: String,
    pub case_field: String,
    #[serde(default = "default_buffer_distance")]
    pub buffer_distance: String,
    #[serde(default = "default_area_field")]
    pub area_field: String,
    #[serde(default = "default_percent_field")]
    pub percent_field: String,
    pub spreadsheet_dir: PathBuf,
    #[serde(default = "default_true")]
    pub keep_intermediates: bool,
    #[serde(default)]
    pub overwrite_output: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurveyAppendConfig {
    #[serde(default)]
    pub points: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    pub points_database: String,
    pub tracks_database: String,
    #[serde(default)]
    pub watersheds: Option<String>,
    #[serde(default = "default_scratch_join")]
    pub scratch_join: String,
    #[serde(default)]
    pub overwrite_output: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhotoTransferConfig {
    #[serde(default)]
    pub photo_folder: Option<PathBuf>,
    pub master_folder: PathBuf,
    #[serde(default = "default_photo_template")]
    pub name_template: String,
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default)]
    pub overwrite_output: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureImportConfig {
    /// Semicolon-delimited list of input feature classes
    pub inputs: String,
    pub output: String,
    #[serde(default = "default_buffer_distance_field")]
    pub buffer_distance_field: String,
    #[serde(default = "default_cover_field")]
    pub cover_field: String,
    #[serde(default)]
    pub overwrite_output: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchSlopeConfig {
    pub raster_dir: PathBuf,
    #[serde(default)]
    pub output_workspace: Option<PathBuf>,
    #[serde(default = "default_slope_suffix")]
    pub output_suffix: String,
    #[serde(default = "default_slope_extension")]
    pub extension: String,
    #[serde(default)]
    pub output_measurement: SlopeMeasurement,
    #[serde(default = "default_z_factor")]
    pub z_factor: f64,
    /// Slope runs refuse to overwrite unless told otherwise
    #[serde(default)]
    pub overwrite_output: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoneSortConfig {
    pub root: PathBuf,
    pub zones: Vec<ZoneTarget>,
    #[serde(default)]
    pub overwrite_output: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ZoneTarget {
    /// Spatial reference name, e.g. `NAD_1927_UTM_Zone_10N`
    pub spatial_reference: String,
    pub directory: PathBuf,
}

impl GeobatchConfig {
    /// Validate every section that is present.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(level) = &self.logging.level {
            require_non_blank(level, "level", "[logging]")?;
        }
        if let Some(survey) = &self.survey {
            survey.validate()?;
        }
        if let Some(section) = &self.veg_summary {
            section.validate()?;
        }
        if let Some(section) = &self.survey_append {
            section.validate()?;
        }
        if let Some(section) = &self.photo_transfer {
            section.validate()?;
        }
        if let Some(section) = &self.feature_import {
            section.validate()?;
        }
        if let Some(section) = &self.batch_slope {
            section.validate()?;
        }
        if let Some(section) = &self.zone_sort {
            section.validate()?;
        }
        Ok(())
    }

    /// Effective overwrite policy for a workflow section override
    pub fn overwrite_for(&self, section_override: Option<bool>) -> bool {
        section_override.unwrap_or(self.workspace.overwrite_output)
    }

    pub fn survey(&self) -> ConfigResult<&SurveyMetadata> {
        self.survey
            .as_ref()
            .ok_or_else(|| ConfigurationError::missing_section("survey"))
    }
}

impl SurveyMetadata {
    pub fn validate(&self) -> ConfigResult<()> {
        require_non_blank(&self.gps_id, "gps_id", "[survey]")?;
        require_non_blank(&self.survey_date, "survey_date", "[survey]")?;
        require_non_blank(&self.team_members, "team_members", "[survey]")?;
        crate::workflows::survey_append::parse_survey_date(&self.survey_date)?;
        Ok(())
    }
}

impl VegSummaryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        const CONTEXT: &str = "[veg_summary]";
        require_non_blank(&self.points, "points", CONTEXT)?;
        require_non_blank(&self.id_field, "id_field", CONTEXT)?;
        require_non_blank(&self.vegetation, "vegetation", CONTEXT)?;
        require_non_blank(&self.case_field, "case_field", CONTEXT)?;
        require_non_blank(&self.area_field, "area_field", CONTEXT)?;
        require_non_blank(&self.percent_field, "percent_field", CONTEXT)?;
        self.buffer_distance.parse::<LinearDistance>().map_err(|reason| {
            ConfigurationError::invalid_value("buffer_distance", &self.buffer_distance, reason)
        })?;
        Ok(())
    }
}

impl SurveyAppendConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        const CONTEXT: &str = "[survey_append]";
        require_non_blank(&self.points_database, "points_database", CONTEXT)?;
        require_non_blank(&self.tracks_database, "tracks_database", CONTEXT)?;
        require_non_blank(&self.scratch_join, "scratch_join", CONTEXT)?;
        Ok(())
    }
}

impl PhotoTransferConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        PhotoNameTemplate::parse(&self.name_template)?;
        if self.master_folder.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "master_folder",
                "[photo_transfer]",
            ));
        }
        Ok(())
    }
}

impl FeatureImportConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        const CONTEXT: &str = "[feature_import]";
        require_non_blank(&self.inputs, "inputs", CONTEXT)?;
        require_non_blank(&self.output, "output", CONTEXT)?;
        require_non_blank(&self.buffer_distance_field, "buffer_distance_field", CONTEXT)?;
        require_non_blank(&self.cover_field, "cover_field", CONTEXT)?;
        Ok(())
    }
}

impl BatchSlopeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        const CONTEXT: &str = "[batch_slope]";
        if self.raster_dir.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field("raster_dir", CONTEXT));
        }
        require_non_blank(&self.output_suffix, "output_suffix", CONTEXT)?;
        require_non_blank(&self.extension, "extension", CONTEXT)?;
        if !self.z_factor.is_finite() || self.z_factor <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "z_factor",
                self.z_factor.to_string(),
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

impl ZoneSortConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.zones.is_empty() {
            return Err(ConfigurationError::missing_required_field("zones", "[zone_sort]"));
        }
        for zone in &self.zones {
            require_non_blank(&zone.spatial_reference, "spatial_reference", "[[zone_sort.zones]]")?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_id_field() -> String {
    "ident".to_string()
}

fn default_buffer_distance() -> String {
    "125 METERS".to_string()
}

fn default_area_field() -> String {
    crate::constants::fields::SHAPE_AREA.to_string()
}

fn default_percent_field() -> String {
    crate::constants::fields::PERCENT.to_string()
}

fn default_scratch_join() -> String {
    "scratchJoin".to_string()
}

fn default_photo_template() -> String {
    crate::constants::DEFAULT_PHOTO_TEMPLATE.to_string()
}

fn default_buffer_distance_field() -> String {
    crate::constants::fields::BUFFER_DISTANCE.to_string()
}

fn default_cover_field() -> String {
    crate::constants::fields::PERCENT_COVER.to_string()
}

fn default_slope_suffix() -> String {
    "_s".to_string()
}

fn default_slope_extension() -> String {
    "3D".to_string()
}

fn default_z_factor() -> f64 {
    1.0
}
