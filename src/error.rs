//! Error types for geobatch.
//!
//! Three layers of failure exist in a batch run:
//!
//! - [`BackendError`]: a single geoprocessing or filesystem call failed.
//! - [`ItemError`]: one work item's step sequence was aborted by a backend
//!   failure. Recorded in the batch report; the batch continues.
//! - [`GeobatchError`]: a fatal precondition was violated before (or around)
//!   item processing. The whole run aborts.

use crate::config::ConfigurationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one backend call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
    #[error("Dataset not found: {0}")]
    NotFound(String),
    #[error("Output already exists and overwrite is disabled: {0}")]
    AlreadyExists(String),
    #[error("Output {artifact} was already produced by item '{claimed_by}' in this run")]
    OutputCollision { artifact: String, claimed_by: String },
    #[error("Extension unavailable: {0}")]
    ExtensionUnavailable(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl BackendError {
    pub fn operation_failed<O: Into<String>, M: std::fmt::Display>(operation: O, message: M) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// True when rerunning with overwrite enabled would have avoided the failure
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl From<std::io::Error> for BackendError {
    fn from(error: std::io::Error) -> Self {
        BackendError::Io(error.to_string())
    }
}

/// One work item's step sequence failed.
///
/// `step_index` is the 1-based position of the failing step within the
/// pipeline, used in place of a source line number.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("Step {step_index} '{operation}' failed for item '{item_id}': {message}")]
pub struct ItemError {
    pub operation: String,
    pub item_id: String,
    pub step_index: usize,
    pub message: String,
}

impl ItemError {
    pub fn new(operation: &str, item_id: &str, step_index: usize, error: &BackendError) -> Self {
        Self {
            operation: operation.to_string(),
            item_id: item_id.to_string(),
            step_index,
            message: error.to_string(),
        }
    }
}

/// Fatal errors that abort a whole run.
#[derive(Debug, Error)]
pub enum GeobatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Missing required input: {0}")]
    MissingInput(String),
    #[error("Backend error during {operation}: {source}")]
    Backend {
        operation: String,
        #[source]
        source: BackendError,
    },
    #[error("Batch step {step_index} '{operation}' failed: {message}")]
    Finalization {
        operation: String,
        step_index: usize,
        message: String,
    },
}

impl GeobatchError {
    pub fn backend<O: Into<String>>(operation: O, source: BackendError) -> Self {
        Self::Backend {
            operation: operation.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeobatchError>;
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_error_carries_position_marker() {
        let error = ItemError::new(
            "clip_vegetation",
            "SBI_12",
            3,
            &BackendError::NotFound("SBI_12_buff".to_string()),
        );

        assert_eq!(error.step_index, 3);
        assert_eq!(
            error.to_string(),
            "Step 3 'clip_vegetation' failed for item 'SBI_12': Dataset not found: SBI_12_buff"
        );
    }

    #[test]
    fn finalization_error_names_the_batch_step() {
        let error = GeobatchError::Finalization {
            operation: "merge_all".to_string(),
            step_index: 2,
            message: "Dataset not found: merged".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Batch step 2 'merge_all' failed: Dataset not found: merged"
        );
    }

    #[test]
    fn io_errors_convert_to_backend_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: BackendError = io.into();
        assert!(matches!(error, BackendError::Io(ref msg) if msg.contains("denied")));
        assert!(!error.is_already_exists());
    }
}
