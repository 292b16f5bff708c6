//! Load a field survey's GPS points and track into the survey database.
//!
//! Each supplied input gets the survey metadata fields, points are tagged
//! with their watershed by spatial join, and both are appended to their
//! master feature class. Inputs left blank are skipped.

use super::common::{AddFields, CalculateFields, Target};
use super::{path_string, require_section, Backends};
use crate::backend::{FieldComputation, SpatialJoinParams};
use crate::config::{ConfigResult, ConfigurationError, GeobatchConfig, SurveyAppendConfig, SurveyMetadata};
use crate::constants::{attributes, constant_keys as keys, fields, steps};
use crate::error::{BackendResult, Result};
use crate::models::{ArtifactRef, BatchReport, FieldSpec, FieldValue, StepOutput, WorkItem};
use crate::pipeline::{Pipeline, PipelineStep, StepContext, StepOutcome, WorkflowConstants};
use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde_json::json;
use std::path::Path;
use tracing::info;

const PIPELINE_NAME: &str = "survey_append";

/// Format of the `DateUpload` timestamp
pub const UPLOAD_TIMESTAMP_FORMAT: &str = "%m/%d/%y %H:%M:%S";

/// Item kinds
pub const KIND_POINTS: &str = "points";
pub const KIND_TRACK: &str = "track";

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%m/%d/%y",
    "%m-%d-%Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"];

/// Parse a hand-entered survey date such as `3/2/2015`, `3/2/15`,
/// `2015-03-02` or `March 2, 2015`.
pub fn parse_survey_date(value: &str) -> ConfigResult<NaiveDate> {
    let trimmed = value.trim();
    let plausible = |date: &NaiveDate| date.year() >= 1000;

    let date = DATE_FORMATS
        .iter()
        .filter_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .find(plausible)
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .filter_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
                .map(|datetime| datetime.date())
                .find(plausible)
        });

    date.ok_or_else(|| {
        ConfigurationError::invalid_value("survey_date", value, "unrecognized date format")
    })
}

/// Spatially join the point layer to the watershed polygons through a
/// scratch layer, then copy the result back over the input.
struct JoinWatershed;

#[async_trait]
impl PipelineStep for JoinWatershed {
    fn name(&self) -> &str {
        steps::JOIN_WATERSHED
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::SCRATCH_JOIN]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        if ctx.item.attribute_str(attributes::KIND) != Some(KIND_POINTS) {
            return Ok(StepOutcome::skipped("only point layers are joined to watersheds"));
        }
        let watersheds = match ctx.constants.get(keys::WATERSHEDS) {
            Some(watersheds) if !watersheds.trim().is_empty() => watersheds,
            _ => return Ok(StepOutcome::skipped("no watershed layer configured")),
        };

        let input = ctx.item.location();
        let scratch_workspace = ctx.constants.get(keys::SCRATCH_WORKSPACE).unwrap_or(".");
        let scratch = path_string(&Path::new(scratch_workspace).join(ctx.constant(keys::SCRATCH_JOIN)?));

        if ctx.geo.exists(&scratch).await? {
            ctx.geo.delete(&scratch).await?;
        }
        ctx.register_scratch(ArtifactRef::dataset(scratch.clone()));

        info!(item_id = %ctx.item.id, watersheds = %watersheds, "Joining watershed names");
        ctx.geo
            .spatial_join(&input, watersheds, &scratch, &SpatialJoinParams::default())
            .await?;
        ctx.geo.copy_features(&scratch, &input).await?;

        Ok(StepOutcome::completed(
            StepOutput::artifact(ArtifactRef::Dataset(input)).with_data(json!({ "watersheds": watersheds })),
        ))
    }
}

struct AppendToDatabase;

#[async_trait]
impl PipelineStep for AppendToDatabase {
    fn name(&self) -> &str {
        steps::APPEND_TO_DATABASE
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::POINTS_DATABASE, keys::TRACKS_DATABASE]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let target = match ctx.item.attribute_str(attributes::KIND) {
            Some(KIND_TRACK) => ctx.constant(keys::TRACKS_DATABASE)?,
            _ => ctx.constant(keys::POINTS_DATABASE)?,
        };
        let input = ctx.item.location();

        info!(item_id = %ctx.item.id, target = %target, "Appending survey data");
        ctx.geo.append(&input, target).await?;
        Ok(StepOutcome::artifact(ArtifactRef::dataset(target)))
    }
}

fn survey_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::text(fields::GPS_ID, 20),
        FieldSpec::date(fields::SURVEY_DATE),
        FieldSpec::text(fields::SURVEY_TEAM, 50),
        FieldSpec::text(fields::COLLECTION_DIR, 50),
        FieldSpec::text(fields::DATE_UPLOAD, 20),
    ]
}

fn survey_values(survey: &SurveyMetadata, uploaded_at: NaiveDateTime) -> ConfigResult<Vec<(String, FieldComputation)>> {
    let survey_date = parse_survey_date(&survey.survey_date)?
        .and_hms_opt(0, 0, 0)
        .map(FieldValue::Date)
        .unwrap_or(FieldValue::Null);
    let upload = uploaded_at.format(UPLOAD_TIMESTAMP_FORMAT).to_string();

    Ok(vec![
        (fields::GPS_ID.to_string(), FieldComputation::constant(survey.gps_id.as_str())),
        (fields::SURVEY_DATE.to_string(), FieldComputation::constant(survey_date)),
        (fields::SURVEY_TEAM.to_string(), FieldComputation::constant(survey.team_members.as_str())),
        (fields::COLLECTION_DIR.to_string(), FieldComputation::constant(survey.collection_dir.as_str())),
        (fields::DATE_UPLOAD.to_string(), FieldComputation::constant(upload)),
    ])
}

pub fn pipeline(survey: &SurveyMetadata, uploaded_at: NaiveDateTime) -> ConfigResult<Pipeline> {
    Pipeline::builder(PIPELINE_NAME)
        .step(AddFields::new(steps::ADD_SURVEY_FIELDS, Target::Item, survey_fields()))
        .step(CalculateFields::new(
            steps::POPULATE_SURVEY_FIELDS,
            Target::Item,
            survey_values(survey, uploaded_at)?,
        ))
        .step(JoinWatershed)
        .step(AppendToDatabase)
        .build()
}

pub fn constants(config: &GeobatchConfig, section: &SurveyAppendConfig) -> WorkflowConstants {
    let mut constants = WorkflowConstants::new()
        .with(keys::SCRATCH_WORKSPACE, path_string(&config.workspace.scratch_dir()))
        .with(keys::POINTS_DATABASE, section.points_database.as_str())
        .with(keys::TRACKS_DATABASE, section.tracks_database.as_str())
        .with(keys::SCRATCH_JOIN, section.scratch_join.as_str());
    if let Some(watersheds) = &section.watersheds {
        constants.insert(keys::WATERSHEDS, watersheds.as_str());
    }
    constants
}

/// Points first, then the track; blank inputs are left out
pub fn work_items(section: &SurveyAppendConfig) -> Vec<WorkItem> {
    [(KIND_POINTS, &section.points), (KIND_TRACK, &section.track)]
        .into_iter()
        .filter_map(|(kind, input)| {
            let input = input.as_deref().map(str::trim).filter(|input| !input.is_empty())?;
            Some(WorkItem::new(input).with_attribute(attributes::KIND, kind))
        })
        .collect()
}

/// Tag and append the configured survey inputs.
pub async fn run(config: &GeobatchConfig, backends: &Backends) -> Result<BatchReport> {
    let section = require_section(&config.survey_append, PIPELINE_NAME, SurveyAppendConfig::validate)?;
    let survey = config.survey()?;
    survey.validate()?;

    let pipeline = pipeline(survey, Local::now().naive_local())?;
    let constants = constants(config, section);
    let items = work_items(section);
    if items.is_empty() {
        info!(pipeline = PIPELINE_NAME, "No point or track input supplied; nothing to append");
    }

    backends
        .runner(config, config.overwrite_for(section.overwrite_output))
        .run(&pipeline, &constants, futures::stream::iter(items))
        .await
}
