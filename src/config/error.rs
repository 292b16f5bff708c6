//! Configuration Error Types
//!
//! Error handling for configuration loading and validation. Every variant is
//! fatal: a run with a bad configuration never starts processing items.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Configuration file not found at expected locations
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Configuration sources could not be read or deserialized
    #[error("Parse Error for file {file_path}: {reason}")]
    ParseError { file_path: String, reason: String },

    /// A workflow section is required but absent
    #[error("Missing configuration section '[{section}]'")]
    MissingSection { section: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Pipeline definition without per-item steps
    #[error("Pipeline '{pipeline}' has no steps")]
    EmptyPipeline { pipeline: String },

    /// Two steps in one pipeline share a name
    #[error("Pipeline '{pipeline}' declares step '{step}' more than once")]
    DuplicateStep { pipeline: String, step: String },

    /// Naming template references a placeholder nobody provides
    #[error("Unknown placeholder '{{{placeholder}}}' in template '{template}'")]
    UnknownPlaceholder { placeholder: String, template: String },
}

impl ConfigurationError {
    /// Create a missing required field error
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create a missing section error
    pub fn missing_section<S: Into<String>>(section: S) -> Self {
        Self::MissingSection {
            section: section.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error<P: Into<String>, E: std::fmt::Display>(file_path: P, error: E) -> Self {
        Self::ParseError {
            file_path: file_path.into(),
            reason: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

/// Fails with `MissingRequiredField` when `value` is empty or whitespace.
pub fn require_non_blank(value: &str, field: &str, context: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        Err(ConfigurationError::missing_required_field(field, context))
    } else {
        Ok(())
    }
}
