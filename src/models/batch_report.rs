use super::artifact::StepOutput;
use super::step_result::{StepResult, StepStatus};
use super::work_item::WorkItem;
use crate::error::{GeobatchError, ItemError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one work item's step sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    /// 1-based enumeration order
    pub position: usize,
    pub item: WorkItem,
    pub results: Vec<StepResult>,
    pub error: Option<ItemError>,
}

impl ItemReport {
    pub fn new(position: usize, item: WorkItem) -> Self {
        Self {
            position,
            item,
            results: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Output of a completed step, by step name
    pub fn output_of(&self, step_name: &str) -> Option<&StepOutput> {
        self.results
            .iter()
            .find(|result| result.step_name == step_name && result.status == StepStatus::Completed)
            .map(|result| &result.output)
    }

    pub fn result_of(&self, step_name: &str) -> Option<&StepResult> {
        self.results.iter().find(|result| result.step_name == step_name)
    }

    pub fn completed_steps(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == StepStatus::Completed)
            .count()
    }
}

/// Aggregate outcome of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub pipeline: String,
    pub items: Vec<ItemReport>,
    /// Results of the aggregate steps run once after all items
    pub batch_results: Vec<StepResult>,
    pub batch_error: Option<ItemError>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Enumeration stopped early because of the error policy
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn new<S: Into<String>>(pipeline: S) -> Self {
        Self {
            pipeline: pipeline.into(),
            items: Vec::new(),
            batch_results: Vec::new(),
            batch_error: None,
            processed: 0,
            succeeded: 0,
            failed: 0,
            aborted: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Recompute the counters from the item reports
    pub fn tally(&mut self) {
        self.processed = self.items.len();
        self.succeeded = self.items.iter().filter(|item| item.succeeded()).count();
        self.failed = self.processed - self.succeeded;
    }

    pub fn item(&self, id: &str) -> Option<&ItemReport> {
        self.items.iter().find(|report| report.item.id == id)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ItemError> {
        self.items
            .iter()
            .filter_map(|report| report.error.as_ref())
            .chain(self.batch_error.as_ref())
    }

    /// The batch step failure as a fatal run error, if one occurred
    pub fn finalization_error(&self) -> Option<GeobatchError> {
        self.batch_error.as_ref().map(|error| GeobatchError::Finalization {
            operation: error.operation.clone(),
            step_index: error.step_index,
            message: error.message.clone(),
        })
    }

    /// True when every item and every batch step succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.batch_error.is_none() && !self.aborted
    }
}
