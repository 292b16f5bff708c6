//! In-memory geoprocessing backend.
//!
//! Datasets live in a map keyed by name. Attribute operations (select,
//! statistics, field calculation, append, merge) are computed for real;
//! geometry operations keep records and approximate areas (a buffered point
//! becomes a circle of the buffer radius). Every call is logged and any
//! operation can be made to fail for targets containing a given fragment,
//! which is what the pipeline tests rely on.

use super::params::{
    AttributeFilter, BufferDistance, BufferParams, DataType, DatasetDescription, Dissolve,
    FieldComputation, ShapeType, SlopeParams, SpatialJoinParams, Statistic, StatisticSpec,
};
use super::GeoprocessingBackend;
use crate::constants::fields;
use crate::error::{BackendError, BackendResult};
use crate::models::{FieldSpec, FieldType, FieldValue, Record};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A dataset held by [`MemoryBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub description: DatasetDescription,
    pub fields: Vec<FieldSpec>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(description: DatasetDescription) -> Self {
        Self {
            description,
            fields: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn feature_class<S: Into<String>>(name: S, shape_type: ShapeType) -> Self {
        Self::new(DatasetDescription::feature_class(name, shape_type))
    }

    pub fn table<S: Into<String>>(name: S) -> Self {
        Self::new(DatasetDescription::table(name))
    }

    pub fn raster<S: Into<String>>(name: S) -> Self {
        Self::new(DatasetDescription::raster(name))
    }

    pub fn with_spatial_reference<S: Into<String>>(mut self, spatial_reference: S) -> Self {
        self.description.spatial_reference = Some(spatial_reference.into());
        self
    }

    /// Set the records; field definitions are inferred from their values
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        for record in &records {
            for (name, value) in &record.values {
                if self.field(name).is_none() {
                    let field_type = match value {
                        FieldValue::Double(_) => FieldType::Double,
                        FieldValue::Integer(_) => FieldType::Integer,
                        FieldValue::Date(_) => FieldType::Date,
                        FieldValue::Text(_) | FieldValue::Null => FieldType::Text,
                    };
                    self.fields.push(FieldSpec {
                        name: name.clone(),
                        field_type,
                        length: None,
                        precision: None,
                        nullable: true,
                    });
                }
            }
        }
        self.records = records;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn has_field(&self, name: &str) -> bool {
        name == fields::SHAPE_AREA || self.field(name).is_some()
    }

    /// Copy under a new name
    fn renamed(&self, output: &str) -> Dataset {
        let mut copy = self.clone();
        copy.description.name = base_name(output);
        copy
    }
}

/// One logged backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub operation: String,
    pub target: String,
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: String,
    fragment: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    datasets: BTreeMap<String, Dataset>,
    spreadsheets: BTreeMap<PathBuf, Vec<Record>>,
    extensions: BTreeSet<String>,
    checked_out: BTreeSet<String>,
    failures: Vec<FailureRule>,
    calls: Vec<BackendCall>,
}

impl MemoryState {
    /// Log the call and apply failure injection
    fn record(&mut self, operation: &str, target: &str) -> BackendResult<()> {
        self.calls.push(BackendCall {
            operation: operation.to_string(),
            target: target.to_string(),
        });
        let injected = self
            .failures
            .iter()
            .any(|rule| rule.operation == operation && target.contains(&rule.fragment));
        if injected {
            return Err(BackendError::operation_failed(
                operation,
                format!("injected failure for '{target}'"),
            ));
        }
        Ok(())
    }

    fn get(&self, name: &str) -> BackendResult<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }

    fn get_mut(&mut self, name: &str) -> BackendResult<&mut Dataset> {
        self.datasets
            .get_mut(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }

    fn put(&mut self, name: &str, mut dataset: Dataset) {
        renumber(&mut dataset.records);
        debug!(dataset = %name, records = dataset.records.len(), "memory backend wrote dataset");
        self.datasets.insert(name.to_string(), dataset);
    }
}

/// [`GeoprocessingBackend`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset<S: Into<String>>(self, name: S, dataset: Dataset) -> Self {
        self.insert_dataset(name, dataset);
        self
    }

    /// Make a licensed extension available for check-out
    pub fn with_extension<S: Into<String>>(self, extension: S) -> Self {
        self.state.lock().extensions.insert(extension.into());
        self
    }

    pub fn insert_dataset<S: Into<String>>(&self, name: S, dataset: Dataset) {
        self.state.lock().datasets.insert(name.into(), dataset);
    }

    pub fn dataset(&self, name: &str) -> Option<Dataset> {
        self.state.lock().datasets.get(name).cloned()
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.state.lock().datasets.keys().cloned().collect()
    }

    /// Rows exported by `table_to_spreadsheet` to `path`
    pub fn spreadsheet(&self, path: &Path) -> Option<Vec<Record>> {
        self.state.lock().spreadsheets.get(path).cloned()
    }

    /// Fail every `operation` call whose target contains `fragment`
    pub fn fail_on<O: Into<String>, F: Into<String>>(&self, operation: O, fragment: F) {
        self.state.lock().failures.push(FailureRule {
            operation: operation.into(),
            fragment: fragment.into(),
        });
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Number of logged calls of `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn checked_out_extensions(&self) -> Vec<String> {
        self.state.lock().checked_out.iter().cloned().collect()
    }
}

#[async_trait]
impl GeoprocessingBackend for MemoryBackend {
    async fn exists(&self, dataset: &str) -> BackendResult<bool> {
        Ok(self.state.lock().datasets.contains_key(dataset))
    }

    async fn describe(&self, dataset: &str) -> BackendResult<DatasetDescription> {
        let mut state = self.state.lock();
        state.record("describe", dataset)?;
        Ok(state.get(dataset)?.description.clone())
    }

    async fn delete(&self, dataset: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("delete", dataset)?;
        state
            .datasets
            .remove(dataset)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(dataset.to_string()))
    }

    async fn select(&self, input: &str, output: &str, filter: &AttributeFilter) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("select", output)?;
        let source = state.get(input)?;
        if !source.has_field(&filter.field) {
            return Err(BackendError::operation_failed(
                "select",
                format!("field '{}' does not exist in {input}", filter.field),
            ));
        }
        let mut selected = source.renamed(output);
        selected.records.retain(|record| filter.matches(record));
        state.put(output, selected);
        Ok(())
    }

    async fn buffer(&self, input: &str, output: &str, params: &BufferParams) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("buffer", output)?;
        let source = state.get(input)?;
        let mut buffered = source.renamed(output);
        buffered.description.shape_type = Some(ShapeType::Polygon);

        for record in &mut buffered.records {
            let radius = match &params.distance {
                BufferDistance::Linear(distance) => distance.to_meters(),
                BufferDistance::Field(field) => record.number(field).ok_or_else(|| {
                    BackendError::operation_failed(
                        "buffer",
                        format!("record {} has no numeric '{field}'", record.object_id),
                    )
                })?,
            };
            let disc = PI * radius * radius;
            record.shape_area = Some(record.shape_area.map_or(disc, |area| area + disc));
        }

        buffered.records = match &params.dissolve {
            Dissolve::None => buffered.records,
            Dissolve::All => dissolve_records(buffered.records, &[]),
            Dissolve::List(keys) => dissolve_records(buffered.records, keys),
        };
        state.put(output, buffered);
        Ok(())
    }

    async fn clip(&self, input: &str, clip_features: &str, output: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("clip", output)?;
        state.get(clip_features)?;
        let clipped = state.get(input)?.renamed(output);
        state.put(output, clipped);
        Ok(())
    }

    async fn spatial_join(
        &self,
        target: &str,
        join: &str,
        output: &str,
        params: &SpatialJoinParams,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("spatial_join", output)?;
        let join_dataset = state.get(join)?.clone();
        let mut joined = state.get(target)?.renamed(output);

        match join_dataset.records.first() {
            Some(first) => {
                for field in &join_dataset.fields {
                    if joined.field(&field.name).is_none() {
                        joined.fields.push(field.clone());
                    }
                }
                for record in &mut joined.records {
                    for (name, value) in &first.values {
                        record.values.entry(name.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
            None if !params.keep_all => joined.records.clear(),
            None => {}
        }
        state.put(output, joined);
        Ok(())
    }

    async fn merge(&self, inputs: &[String], output: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("merge", output)?;
        let first = inputs
            .first()
            .ok_or_else(|| BackendError::InvalidInput("merge needs at least one input".to_string()))?;
        let mut merged = state.get(first)?.renamed(output);
        for input in &inputs[1..] {
            let source = state.get(input)?;
            for field in &source.fields {
                if merged.field(&field.name).is_none() {
                    merged.fields.push(field.clone());
                }
            }
            merged.records.extend(source.records.iter().cloned());
            if source.description.shape_type == Some(ShapeType::Polygon) {
                merged.description.shape_type = Some(ShapeType::Polygon);
            }
        }
        state.put(output, merged);
        Ok(())
    }

    async fn copy_features(&self, input: &str, output: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("copy_features", output)?;
        let copy = state.get(input)?.renamed(output);
        state.put(output, copy);
        Ok(())
    }

    async fn append(&self, input: &str, target: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("append", target)?;
        let records = state.get(input)?.records.clone();
        let destination = state.get_mut(target)?;
        let next_id = destination.records.iter().map(|r| r.object_id).max().unwrap_or(0);
        destination
            .records
            .extend(records.into_iter().enumerate().map(|(offset, mut record)| {
                record.object_id = next_id + offset as i64 + 1;
                record
            }));
        Ok(())
    }

    async fn repair_geometry(&self, input: &str, keep_null: bool) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("repair_geometry", input)?;
        let dataset = state.get_mut(input)?;
        if !keep_null {
            dataset.records.retain(|record| record.shape_area.is_some());
        }
        Ok(())
    }

    async fn add_field(&self, table: &str, field: &FieldSpec) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("add_field", table)?;
        let dataset = state.get_mut(table)?;
        if let Some(existing) = dataset.field(&field.name) {
            if existing.field_type == field.field_type {
                debug!(table = %table, field = %field.name, "field already exists");
                return Ok(());
            }
            return Err(BackendError::operation_failed(
                "add_field",
                format!(
                    "field '{}' exists in {table} as {}",
                    field.name, existing.field_type
                ),
            ));
        }
        dataset.fields.push(field.clone());
        for record in &mut dataset.records {
            record.values.insert(field.name.clone(), FieldValue::Null);
        }
        Ok(())
    }

    async fn calculate_field(
        &self,
        table: &str,
        field: &str,
        computation: &FieldComputation,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("calculate_field", table)?;
        let dataset = state.get_mut(table)?;
        if dataset.field(field).is_none() {
            return Err(BackendError::operation_failed(
                "calculate_field",
                format!("field '{field}' does not exist in {table}"),
            ));
        }
        let mut computed = Vec::with_capacity(dataset.records.len());
        for record in &dataset.records {
            let value = computation.evaluate(record).map_err(|reason| {
                BackendError::operation_failed(
                    "calculate_field",
                    format!("{field} on record {}: {reason}", record.object_id),
                )
            })?;
            computed.push(value);
        }
        for (record, value) in dataset.records.iter_mut().zip(computed) {
            record.values.insert(field.to_string(), value);
        }
        Ok(())
    }

    async fn summary_statistics(
        &self,
        input: &str,
        output: &str,
        statistics: &[StatisticSpec],
        case_field: &str,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("summary_statistics", output)?;
        let source = state.get(input)?;
        if !source.has_field(case_field) {
            return Err(BackendError::operation_failed(
                "summary_statistics",
                format!("case field '{case_field}' does not exist in {input}"),
            ));
        }

        let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
        for record in &source.records {
            let key = record.get(case_field).map(|v| v.to_string()).unwrap_or_default();
            groups.entry(key).or_default().push(record);
        }

        let mut table = Dataset::table(base_name(output));
        table.fields.push(FieldSpec::text(case_field, 255));
        table.fields.push(FieldSpec {
            name: fields::FREQUENCY.to_string(),
            field_type: FieldType::Integer,
            length: None,
            precision: None,
            nullable: true,
        });
        for spec in statistics {
            table.fields.push(FieldSpec::double(spec.output_field()));
        }

        for (key, members) in groups {
            let mut row = Record::new(0)
                .with_value(case_field, key)
                .with_value(fields::FREQUENCY, members.len() as i64);
            for spec in statistics {
                let values: Vec<f64> = members.iter().filter_map(|r| r.number(&spec.field)).collect();
                row = row.with_value(spec.output_field(), aggregate(spec.statistic, &values));
            }
            table.records.push(row);
        }
        state.put(output, table);
        Ok(())
    }

    async fn slope(&self, raster: &str, output: &str, _params: &SlopeParams) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("slope", output)?;
        let source = state.get(raster)?;
        if source.description.data_type != DataType::Raster {
            return Err(BackendError::InvalidInput(format!("{raster} is not a raster")));
        }
        let derived = source.renamed(output);
        state.put(output, derived);
        Ok(())
    }

    async fn table_to_spreadsheet(&self, table: &str, output: &Path) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("table_to_spreadsheet", &output.to_string_lossy())?;
        let rows = state.get(table)?.records.clone();
        state.spreadsheets.insert(output.to_path_buf(), rows);
        Ok(())
    }

    async fn search_cursor(
        &self,
        table: &str,
        fields: &[String],
    ) -> BackendResult<BoxStream<'static, Record>> {
        let mut state = self.state.lock();
        state.record("search_cursor", table)?;
        let dataset = state.get(table)?;
        if let Some(missing) = fields.iter().find(|field| !dataset.has_field(field)) {
            return Err(BackendError::operation_failed(
                "search_cursor",
                format!("field '{missing}' does not exist in {table}"),
            ));
        }

        let rows: Vec<Record> = dataset
            .records
            .iter()
            .map(|record| {
                let mut row = record.clone();
                if !fields.is_empty() {
                    row.values.retain(|name, _| fields.contains(name));
                }
                row
            })
            .collect();
        Ok(stream::iter(rows).boxed())
    }

    async fn check_out_extension(&self, extension: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("check_out_extension", extension)?;
        if !state.extensions.contains(extension) {
            return Err(BackendError::ExtensionUnavailable(extension.to_string()));
        }
        state.checked_out.insert(extension.to_string());
        Ok(())
    }

    async fn check_in_extension(&self, extension: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.record("check_in_extension", extension)?;
        state.checked_out.remove(extension);
        Ok(())
    }
}

/// Dataset name from a path-like string: `scratch.gdb/SBI_1_buff` -> `SBI_1_buff`
fn base_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn renumber(records: &mut [Record]) {
    for (index, record) in records.iter_mut().enumerate() {
        record.object_id = index as i64 + 1;
    }
}

/// Merge records sharing the values of `keys`, summing their areas
fn dissolve_records(records: Vec<Record>, keys: &[String]) -> Vec<Record> {
    let mut groups: BTreeMap<Vec<String>, Record> = BTreeMap::new();
    for record in records {
        let key: Vec<String> = keys
            .iter()
            .map(|field| record.get(field).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        match groups.get_mut(&key) {
            Some(kept) => {
                kept.shape_area = match (kept.shape_area, record.shape_area) {
                    (Some(a), Some(b)) => Some(a + b),
                    (a, b) => a.or(b),
                };
            }
            None => {
                let mut kept = Record::new(record.object_id);
                kept.shape_area = record.shape_area;
                for field in keys {
                    if let Some(value) = record.get(field) {
                        kept.values.insert(field.clone(), value.clone());
                    }
                }
                groups.insert(key, kept);
            }
        }
    }
    groups.into_values().collect()
}

fn aggregate(statistic: Statistic, values: &[f64]) -> FieldValue {
    if values.is_empty() && statistic != Statistic::Count {
        return FieldValue::Null;
    }
    let value = match statistic {
        Statistic::Sum => values.iter().sum(),
        Statistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Statistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Statistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Count => values.len() as f64,
    };
    FieldValue::Double(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LinearDistance;
    use futures::StreamExt;

    fn vegetation() -> Dataset {
        Dataset::feature_class("veg", ShapeType::Polygon).with_records(vec![
            Record::new(1).with_value("alliance", "Coastal scrub").with_area(300.0),
            Record::new(2).with_value("alliance", "Grassland").with_area(100.0),
            Record::new(3).with_value("alliance", "Coastal scrub").with_area(100.0),
        ])
    }

    #[tokio::test]
    async fn statistics_sum_area_per_case() {
        let backend = MemoryBackend::new().with_dataset("veg", vegetation());
        backend
            .summary_statistics("veg", "stats", &[StatisticSpec::sum("Shape_Area")], "alliance")
            .await
            .unwrap();

        let stats = backend.dataset("stats").unwrap();
        assert_eq!(stats.records.len(), 2);
        assert_eq!(stats.records[0].number("SUM_Shape_Area"), Some(400.0));
        assert_eq!(stats.records[0].get(fields::FREQUENCY), Some(&FieldValue::Integer(2)));
        assert_eq!(stats.records[1].number("SUM_Shape_Area"), Some(100.0));
    }

    #[tokio::test]
    async fn buffer_list_dissolve_keeps_one_record_per_key() {
        let points = Dataset::feature_class("pts", ShapeType::Point).with_records(vec![
            Record::new(1).with_value("ident", "A"),
            Record::new(2).with_value("ident", "A"),
        ]);
        let backend = MemoryBackend::new().with_dataset("pts", points);
        let params = BufferParams::new(BufferDistance::Linear(LinearDistance::meters(10.0)))
            .dissolve(Dissolve::List(vec!["ident".to_string()]));

        backend.buffer("pts", "pts_buff", &params).await.unwrap();

        let buffered = backend.dataset("pts_buff").unwrap();
        assert_eq!(buffered.records.len(), 1);
        assert_eq!(buffered.description.shape_type, Some(ShapeType::Polygon));
        let area = buffered.records[0].shape_area.unwrap();
        assert!((area - 2.0 * PI * 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn injected_failures_match_operation_and_target() {
        let backend = MemoryBackend::new().with_dataset("veg", vegetation());
        backend.fail_on("copy_features", "_broken");

        assert!(backend.copy_features("veg", "veg_ok").await.is_ok());
        let err = backend.copy_features("veg", "veg_broken").await.unwrap_err();
        assert!(matches!(err, BackendError::OperationFailed { .. }));
        assert_eq!(backend.call_count("copy_features"), 2);
    }

    #[tokio::test]
    async fn cursor_projects_requested_fields() {
        let backend = MemoryBackend::new().with_dataset("veg", vegetation());
        let rows: Vec<Record> = backend
            .search_cursor("veg", &["alliance".to_string()])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.values.len() == 1));

        assert!(backend.search_cursor("veg", &["nope".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn add_field_is_idempotent_for_same_type() {
        let backend = MemoryBackend::new().with_dataset("veg", vegetation());
        backend.add_field("veg", &FieldSpec::double("Percent")).await.unwrap();
        backend.add_field("veg", &FieldSpec::double("Percent")).await.unwrap();
        assert!(backend.add_field("veg", &FieldSpec::text("Percent", 9)).await.is_err());
        assert_eq!(backend.dataset("veg").unwrap().fields.len(), 2);
    }

    #[tokio::test]
    async fn extensions_must_be_licensed() {
        let backend = MemoryBackend::new().with_extension("3D");
        backend.check_out_extension("3D").await.unwrap();
        assert_eq!(backend.checked_out_extensions(), vec!["3D".to_string()]);
        assert!(matches!(
            backend.check_out_extension("Spatial").await,
            Err(BackendError::ExtensionUnavailable(_))
        ));
        backend.check_in_extension("3D").await.unwrap();
        assert!(backend.checked_out_extensions().is_empty());
    }
}
