#![allow(clippy::doc_markdown)] // Allow technical terms like GeoTIFF, GlobalID in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Geobatch
//!
//! Batch geoprocessing pipelines: apply an ordered list of geoprocessing
//! steps to every item of an input collection, keep going when one item
//! fails, and report what happened to each item.
//!
//! ## Overview
//!
//! Field GIS work is full of the same loop: for every point in a layer (or
//! raster in a folder, or photo from a survey) run a handful of toolkit
//! operations in sequence and write the results somewhere. Geobatch keeps
//! that loop in one place, the [`pipeline::PipelineRunner`], and expresses
//! each workflow as a list of named steps.
//!
//! ## Architecture
//!
//! - Work items are pulled lazily from a `Stream` (a record cursor, a
//!   directory walk) and processed strictly one after another
//! - A failing step stops its item only; the error is recorded with the
//!   operation name, the item id and the step's position
//! - Aggregate values that need a complete table (percentages of a total)
//!   are computed in an explicit second pass
//! - All geometry and file-format work is delegated to a
//!   [`backend::GeoprocessingBackend`] and a [`backend::FileSystemBackend`]
//!
//! ## Module Organization
//!
//! - [`pipeline`] - Steps, pipelines and the runner
//! - [`backend`] - Backend traits, parameter types and the bundled backends
//! - [`sources`] - Directory walker, spatial reference filter, record cursor
//! - [`workflows`] - The concrete workflows
//! - [`models`] - Work items, step results and reports
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geobatch::backend::{LocalFileSystem, MemoryBackend};
//! use geobatch::config::ConfigManager;
//! use geobatch::workflows::{batch_slope, Backends};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let backends = Backends::new(Arc::new(MemoryBackend::new()), Arc::new(LocalFileSystem::new()));
//!
//! let report = batch_slope::run(manager.config(), &backends).await?;
//! for error in report.errors() {
//!     eprintln!("{error}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod workflows;

pub use backend::{FileSystemBackend, GeoprocessingBackend, LocalFileSystem, MemoryBackend};
pub use config::{ConfigManager, ConfigurationError, GeobatchConfig};
pub use error::{BackendError, GeobatchError, ItemError, Result};
pub use models::{BatchReport, ItemReport, StepResult, StepStatus, WorkItem};
pub use pipeline::{
    ErrorPolicy, Pipeline, PipelineRunner, PipelineStep, RunSettings, StepContext, StepOutcome,
    WorkflowConstants,
};
pub use workflows::Backends;
