use super::artifact::StepOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step completed successfully
    Completed,
    /// Step failed; remaining steps of the item were not run
    Failed,
    /// Step decided it does not apply to this item
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of one step for one work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 1-based position of the step in the pipeline
    pub step_index: usize,
    pub step_name: String,
    pub status: StepStatus,
    pub output: StepOutput,
    /// Failure message, or the skip reason
    pub message: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn completed(step_index: usize, step_name: &str, output: StepOutput, duration_ms: u64) -> Self {
        Self {
            step_index,
            step_name: step_name.to_string(),
            status: StepStatus::Completed,
            output,
            message: None,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(step_index: usize, step_name: &str, reason: String, duration_ms: u64) -> Self {
        Self {
            step_index,
            step_name: step_name.to_string(),
            status: StepStatus::Skipped,
            output: StepOutput::default(),
            message: Some(reason),
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(step_index: usize, step_name: &str, message: String, duration_ms: u64) -> Self {
        Self {
            step_index,
            step_name: step_name.to_string(),
            status: StepStatus::Failed,
            output: StepOutput::default(),
            message: Some(message),
            duration_ms,
            finished_at: Utc::now(),
        }
    }
}
