//! Rename survey photos after the survey and collect them in the master
//! photo folder.

use super::{path_string, require_directory, Backends};
use crate::config::{ConfigResult, ConfigurationError, GeobatchConfig, PhotoTransferConfig, SurveyMetadata};
use crate::constants::{constant_keys as keys, steps};
use crate::error::{BackendError, BackendResult, Result};
use crate::models::{ArtifactRef, BatchReport, StepOutput, WorkItem};
use crate::pipeline::{Pipeline, PipelineStep, StepContext, StepOutcome, WorkflowConstants};
use crate::sources::{by_extension, DirectoryWalker};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

const PIPELINE_NAME: &str = "photo_transfer";

const PLACEHOLDERS: &[&str] = &["date", "team", "gps_id", "stem"];

/// How photos reach the master folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Rename in the photo folder, then copy to the master folder
    #[default]
    Rename,
    /// Copy under the new name; the photo folder is left as it was
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Photo file name template with `{date}`, `{team}`, `{gps_id}` and
/// `{stem}` placeholders. The original extension is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoNameTemplate {
    segments: Vec<Segment>,
}

/// Values substituted into a [`PhotoNameTemplate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoNameValues {
    /// Survey date as `%Y-%m-%d`
    pub date: String,
    pub team: String,
    pub gps_id: String,
}

impl PhotoNameValues {
    pub fn from_survey(survey: &SurveyMetadata) -> ConfigResult<Self> {
        let date = super::survey_append::parse_survey_date(&survey.survey_date)?;
        Ok(Self {
            date: date.format("%Y-%m-%d").to_string(),
            team: survey.team_members.clone(),
            gps_id: survey.gps_id.clone(),
        })
    }
}

impl PhotoNameTemplate {
    pub fn parse(template: &str) -> ConfigResult<Self> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                ConfigurationError::invalid_value("name_template", template, "unclosed '{'")
            })?;
            let name = &after[..close];
            if !PLACEHOLDERS.contains(&name) {
                return Err(ConfigurationError::UnknownPlaceholder {
                    placeholder: name.to_string(),
                    template: template.to_string(),
                });
            }
            segments.push(Segment::Placeholder(name.to_string()));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        if !segments.iter().any(|segment| matches!(segment, Segment::Placeholder(_))) {
            return Err(ConfigurationError::invalid_value(
                "name_template",
                template,
                "must contain at least one placeholder",
            ));
        }
        Ok(Self { segments })
    }

    /// New file name for `file`, keeping its extension
    pub fn render(&self, values: &PhotoNameValues, file: &Path) -> String {
        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut name: String = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Placeholder(placeholder) => match placeholder.as_str() {
                    "date" => values.date.as_str(),
                    "team" => values.team.as_str(),
                    "gps_id" => values.gps_id.as_str(),
                    _ => stem.as_str(),
                },
            })
            .collect();
        if let Some(extension) = file.extension() {
            name.push('.');
            name.push_str(&extension.to_string_lossy());
        }
        name
    }
}

fn item_path(ctx: &StepContext<'_>) -> BackendResult<PathBuf> {
    ctx.item
        .path
        .clone()
        .ok_or_else(|| BackendError::InvalidInput(format!("item '{}' has no file path", ctx.item.id)))
}

struct RenamePhoto {
    template: PhotoNameTemplate,
    values: PhotoNameValues,
    mode: TransferMode,
}

#[async_trait]
impl PipelineStep for RenamePhoto {
    fn name(&self) -> &str {
        steps::RENAME_PHOTO
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        if self.mode == TransferMode::Copy {
            return Ok(StepOutcome::skipped("copy mode leaves the photo folder untouched"));
        }
        let source = item_path(ctx)?;
        let renamed = source.with_file_name(self.template.render(&self.values, &source));

        let artifact = ctx.claim_file(renamed.clone()).await?;
        info!(from = %source.display(), to = %renamed.display(), "Renaming photo");
        ctx.fs.rename(&source, &renamed).await?;
        Ok(StepOutcome::artifact(artifact))
    }
}

struct CopyPhoto {
    template: PhotoNameTemplate,
    values: PhotoNameValues,
}

#[async_trait]
impl PipelineStep for CopyPhoto {
    fn name(&self) -> &str {
        steps::COPY_PHOTO
    }

    fn required_constants(&self) -> &[&'static str] {
        &[keys::MASTER_FOLDER]
    }

    async fn execute(&self, ctx: &mut StepContext<'_>) -> BackendResult<StepOutcome> {
        let master = PathBuf::from(ctx.constant(keys::MASTER_FOLDER)?);
        let original = item_path(ctx)?;
        let source = ctx
            .output_of(steps::RENAME_PHOTO)
            .and_then(StepOutput::primary)
            .and_then(ArtifactRef::as_file)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| original.clone());
        let destination = master.join(self.template.render(&self.values, &original));

        let artifact = ctx.claim_file(destination.clone()).await?;
        ctx.fs.create_dir_all(&master).await?;
        info!(from = %source.display(), to = %destination.display(), "Copying photo to master folder");
        let bytes = ctx.fs.copy(&source, &destination).await?;
        Ok(StepOutcome::completed(
            StepOutput::artifact(artifact).with_data(json!({ "bytes": bytes })),
        ))
    }
}

pub fn pipeline(section: &PhotoTransferConfig, values: PhotoNameValues) -> ConfigResult<Pipeline> {
    let template = PhotoNameTemplate::parse(&section.name_template)?;
    Pipeline::builder(PIPELINE_NAME)
        .step(RenamePhoto {
            template: template.clone(),
            values: values.clone(),
            mode: section.mode,
        })
        .step(CopyPhoto { template, values })
        .build()
}

pub fn constants(section: &PhotoTransferConfig) -> WorkflowConstants {
    WorkflowConstants::new().with(keys::MASTER_FOLDER, path_string(&section.master_folder))
}

/// `*.jpg` files directly inside the photo folder
pub fn photo_walker(photo_folder: &Path) -> DirectoryWalker {
    DirectoryWalker::new(photo_folder)
        .recursive(false)
        .filter(by_extension(&["jpg", "jpeg"]))
}

/// Rename and copy the photos of one survey. Without a photo folder there is
/// nothing to do and the report is empty.
pub async fn run(config: &GeobatchConfig, backends: &Backends) -> Result<BatchReport> {
    let section = super::require_section(&config.photo_transfer, PIPELINE_NAME, PhotoTransferConfig::validate)?;
    let survey = config.survey()?;
    let values = PhotoNameValues::from_survey(survey)?;
    let pipeline = pipeline(section, values)?;
    let constants = constants(section);
    let runner = backends.runner(config, config.overwrite_for(section.overwrite_output));

    let photo_folder = match section.photo_folder.as_deref() {
        Some(folder) if !folder.as_os_str().is_empty() => folder,
        _ => {
            info!(pipeline = PIPELINE_NAME, "No photo folder supplied; skipping photo transfer");
            return runner
                .run(&pipeline, &constants, futures::stream::empty::<WorkItem>())
                .await;
        }
    };
    require_directory(backends.fs.as_ref(), photo_folder).await?;

    runner
        .run(&pipeline, &constants, photo_walker(photo_folder).into_stream())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> PhotoNameValues {
        PhotoNameValues {
            date: "2015-03-02".to_string(),
            team: "RR_PA".to_string(),
            gps_id: "GPS7".to_string(),
        }
    }

    #[test]
    fn default_template_renders_survey_name() {
        let template = PhotoNameTemplate::parse(crate::constants::DEFAULT_PHOTO_TEMPLATE).unwrap();
        assert_eq!(
            template.render(&values(), Path::new("/photos/IMG_0001.jpg")),
            "2015-03-02_RR_PA_GPS7_IMG_0001.jpg"
        );
    }

    #[test]
    fn unknown_placeholders_are_rejected() {
        let err = PhotoNameTemplate::parse("{date}_{island}").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownPlaceholder {
                placeholder: "island".to_string(),
                template: "{date}_{island}".to_string(),
            }
        );
        assert!(PhotoNameTemplate::parse("{date").is_err());
        assert!(PhotoNameTemplate::parse("photo").is_err());
    }

    #[test]
    fn transfer_mode_defaults_to_rename() {
        assert_eq!(TransferMode::default(), TransferMode::Rename);
        let mode: TransferMode = serde_json::from_str("\"copy\"").unwrap();
        assert_eq!(mode, TransferMode::Copy);
    }
}
