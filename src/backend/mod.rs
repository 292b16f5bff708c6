//! # Backends
//!
//! The capabilities a pipeline delegates to. The runner never performs
//! geometry or file-format work itself; every such operation goes through
//! [`GeoprocessingBackend`] or [`FileSystemBackend`].
//!
//! - [`LocalFileSystem`]: the real filesystem through `tokio::fs`
//! - [`MemoryBackend`]: in-memory geoprocessing for dry runs and tests

pub mod local_fs;
pub mod memory;
pub mod params;

use crate::error::BackendResult;
use crate::models::{FieldSpec, Record};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};

pub use local_fs::LocalFileSystem;
pub use memory::{BackendCall, Dataset, MemoryBackend};
pub use params::{
    AttributeFilter, BufferDistance, BufferParams, DataType, DatasetDescription, Dissolve,
    FieldComputation, JoinOperation, LineEnd, LineSide, LinearDistance, LinearUnit, ShapeType,
    SlopeMeasurement, SlopeParams, SpatialJoinParams, Statistic, StatisticSpec,
};

/// Geoprocessing toolkit operations consumed by the workflows.
///
/// Datasets are addressed by name or path strings. Implementations overwrite
/// existing outputs; overwrite policy is enforced by the runner before the
/// call is made.
#[async_trait]
pub trait GeoprocessingBackend: Send + Sync {
    async fn exists(&self, dataset: &str) -> BackendResult<bool>;

    /// Shape type, spatial reference name and data type of a dataset
    async fn describe(&self, dataset: &str) -> BackendResult<DatasetDescription>;

    async fn delete(&self, dataset: &str) -> BackendResult<()>;

    /// Copy the records matching `filter` into a new feature class
    async fn select(&self, input: &str, output: &str, filter: &AttributeFilter) -> BackendResult<()>;

    async fn buffer(&self, input: &str, output: &str, params: &BufferParams) -> BackendResult<()>;

    async fn clip(&self, input: &str, clip_features: &str, output: &str) -> BackendResult<()>;

    async fn spatial_join(
        &self,
        target: &str,
        join: &str,
        output: &str,
        params: &SpatialJoinParams,
    ) -> BackendResult<()>;

    async fn merge(&self, inputs: &[String], output: &str) -> BackendResult<()>;

    async fn copy_features(&self, input: &str, output: &str) -> BackendResult<()>;

    /// Append the records of `input` to the existing `target`
    async fn append(&self, input: &str, target: &str) -> BackendResult<()>;

    async fn repair_geometry(&self, input: &str, keep_null: bool) -> BackendResult<()>;

    /// Add a field; adding a field that already exists with the same type is
    /// a no-op
    async fn add_field(&self, table: &str, field: &FieldSpec) -> BackendResult<()>;

    async fn calculate_field(
        &self,
        table: &str,
        field: &str,
        computation: &FieldComputation,
    ) -> BackendResult<()>;

    /// Summary statistics grouped by `case_field`
    async fn summary_statistics(
        &self,
        input: &str,
        output: &str,
        statistics: &[StatisticSpec],
        case_field: &str,
    ) -> BackendResult<()>;

    async fn slope(&self, raster: &str, output: &str, params: &SlopeParams) -> BackendResult<()>;

    async fn table_to_spreadsheet(&self, table: &str, output: &Path) -> BackendResult<()>;

    /// Lazily read records of `table`, keeping only `fields` (all when empty)
    async fn search_cursor(
        &self,
        table: &str,
        fields: &[String],
    ) -> BackendResult<BoxStream<'static, Record>>;

    async fn check_out_extension(&self, extension: &str) -> BackendResult<()>;

    async fn check_in_extension(&self, extension: &str) -> BackendResult<()>;
}

/// Filesystem operations used for photo transfer and output folders.
#[async_trait]
pub trait FileSystemBackend: Send + Sync {
    async fn exists(&self, path: &Path) -> BackendResult<bool>;

    async fn is_dir(&self, path: &Path) -> BackendResult<bool>;

    /// Entries directly inside `dir`, sorted
    async fn list_dir(&self, dir: &Path) -> BackendResult<Vec<PathBuf>>;

    async fn create_dir_all(&self, dir: &Path) -> BackendResult<()>;

    /// Copy a file, replacing `to` if it exists; returns bytes copied
    async fn copy(&self, from: &Path, to: &Path) -> BackendResult<u64>;

    async fn rename(&self, from: &Path, to: &Path) -> BackendResult<()>;

    async fn remove_file(&self, path: &Path) -> BackendResult<()>;
}
