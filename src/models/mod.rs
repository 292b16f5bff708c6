//! # Data Model
//!
//! Plain data carried through a batch run: work items, attribute records,
//! per-step results and the aggregate batch report.

pub mod artifact;
pub mod batch_report;
pub mod record;
pub mod step_result;
pub mod work_item;

pub use artifact::{ArtifactRef, StepOutput};
pub use batch_report::{BatchReport, ItemReport};
pub use record::{FieldSpec, FieldType, FieldValue, Record};
pub use step_result::{StepResult, StepStatus};
pub use work_item::WorkItem;
