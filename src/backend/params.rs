//! Parameter types for geoprocessing operations.

use crate::models::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// What kind of dataset a path or name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    FeatureClass,
    Raster,
    Table,
    Image,
    Other,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeatureClass => write!(f, "feature_class"),
            Self::Raster => write!(f, "raster"),
            Self::Table => write!(f, "table"),
            Self::Image => write!(f, "image"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl DataType {
    /// Classify a file by its extension
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "shp" => Self::FeatureClass,
            "tif" | "tiff" | "img" | "asc" | "dem" | "bil" => Self::Raster,
            "jpg" | "jpeg" => Self::Image,
            _ => Self::Other,
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "feature_class" | "featureclass" => Ok(Self::FeatureClass),
            "raster" | "raster_dataset" => Ok(Self::Raster),
            "table" => Ok(Self::Table),
            "image" => Ok(Self::Image),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid data type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeType {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl ShapeType {
    /// Points and lines have no area and must be buffered before merging
    /// with polygons.
    pub fn needs_buffer(&self) -> bool {
        matches!(self, Self::Point | Self::Multipoint | Self::Polyline)
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point => write!(f, "Point"),
            Self::Multipoint => write!(f, "Multipoint"),
            Self::Polyline => write!(f, "Polyline"),
            Self::Polygon => write!(f, "Polygon"),
        }
    }
}

/// Metadata returned by `describe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescription {
    pub name: String,
    pub data_type: DataType,
    pub shape_type: Option<ShapeType>,
    pub spatial_reference: Option<String>,
}

impl DatasetDescription {
    pub fn feature_class<S: Into<String>>(name: S, shape_type: ShapeType) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::FeatureClass,
            shape_type: Some(shape_type),
            spatial_reference: None,
        }
    }

    pub fn raster<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Raster,
            shape_type: None,
            spatial_reference: None,
        }
    }

    pub fn table<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Table,
            shape_type: None,
            spatial_reference: None,
        }
    }

    pub fn with_spatial_reference<S: Into<String>>(mut self, spatial_reference: S) -> Self {
        self.spatial_reference = Some(spatial_reference.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinearUnit {
    Meters,
    Kilometers,
    Feet,
    Yards,
    Miles,
}

impl LinearUnit {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            Self::Meters => 1.0,
            Self::Kilometers => 1_000.0,
            Self::Feet => 0.3048,
            Self::Yards => 0.9144,
            Self::Miles => 1_609.344,
        }
    }
}

impl fmt::Display for LinearUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meters => write!(f, "METERS"),
            Self::Kilometers => write!(f, "KILOMETERS"),
            Self::Feet => write!(f, "FEET"),
            Self::Yards => write!(f, "YARDS"),
            Self::Miles => write!(f, "MILES"),
        }
    }
}

impl FromStr for LinearUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "METERS" | "METER" | "M" => Ok(Self::Meters),
            "KILOMETERS" | "KILOMETER" | "KM" => Ok(Self::Kilometers),
            "FEET" | "FOOT" | "FT" => Ok(Self::Feet),
            "YARDS" | "YARD" | "YD" => Ok(Self::Yards),
            "MILES" | "MILE" | "MI" => Ok(Self::Miles),
            _ => Err(format!("unknown linear unit '{s}'")),
        }
    }
}

/// A distance with a unit, written like `125 METERS`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearDistance {
    pub value: f64,
    pub unit: LinearUnit,
}

impl LinearDistance {
    pub fn meters(value: f64) -> Self {
        Self {
            value,
            unit: LinearUnit::Meters,
        }
    }

    pub fn to_meters(&self) -> f64 {
        self.value * self.unit.meters_per_unit()
    }
}

impl fmt::Display for LinearDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

impl FromStr for LinearDistance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let value = parts
            .next()
            .ok_or_else(|| "empty distance".to_string())?
            .parse::<f64>()
            .map_err(|e| format!("distance value must be a number: {e}"))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(format!("distance must be positive, got {value}"));
        }
        let unit = match parts.next() {
            Some(unit) => unit.parse()?,
            None => LinearUnit::Meters,
        };
        if parts.next().is_some() {
            return Err(format!("unexpected trailing text in distance '{s}'"));
        }
        Ok(Self { value, unit })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BufferDistance {
    Linear(LinearDistance),
    /// Per-feature distance read from a numeric field, in meters
    Field(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSide {
    #[default]
    Full,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineEnd {
    #[default]
    Round,
    Flat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dissolve {
    #[default]
    None,
    All,
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferParams {
    pub distance: BufferDistance,
    pub side: LineSide,
    pub end: LineEnd,
    pub dissolve: Dissolve,
}

impl BufferParams {
    pub fn new(distance: BufferDistance) -> Self {
        Self {
            distance,
            side: LineSide::default(),
            end: LineEnd::default(),
            dissolve: Dissolve::default(),
        }
    }

    pub fn dissolve(mut self, dissolve: Dissolve) -> Self {
        self.dissolve = dissolve;
        self
    }
}

/// `field = value` selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub field: String,
    pub value: FieldValue,
}

impl AttributeFilter {
    pub fn equals<F: Into<String>, V: Into<FieldValue>>(field: F, value: V) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// SQL-style where clause with quoted field name and escaped text
    pub fn where_clause(&self) -> String {
        match &self.value {
            FieldValue::Text(text) => {
                format!("\"{}\" = '{}'", self.field, text.replace('\'', "''"))
            }
            FieldValue::Null => format!("\"{}\" IS NULL", self.field),
            other => format!("\"{}\" = {}", self.field, other),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match record.get(&self.field) {
            Some(value) => value.to_string() == self.value.to_string(),
            None => self.value.is_null(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Statistic {
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "SUM"),
            Self::Mean => write!(f, "MEAN"),
            Self::Min => write!(f, "MIN"),
            Self::Max => write!(f, "MAX"),
            Self::Count => write!(f, "COUNT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticSpec {
    pub field: String,
    pub statistic: Statistic,
}

impl StatisticSpec {
    pub fn sum<S: Into<String>>(field: S) -> Self {
        Self {
            field: field.into(),
            statistic: Statistic::Sum,
        }
    }

    /// Name of the field the statistic is written to, e.g. `SUM_Shape_Area`
    pub fn output_field(&self) -> String {
        format!("{}_{}", self.statistic, self.field)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinOperation {
    #[default]
    OneToOne,
    OneToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialJoinParams {
    pub operation: JoinOperation,
    /// Keep target features without a match
    pub keep_all: bool,
}

impl Default for SpatialJoinParams {
    fn default() -> Self {
        Self {
            operation: JoinOperation::OneToOne,
            keep_all: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeMeasurement {
    #[default]
    Degree,
    PercentRise,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlopeParams {
    pub measurement: SlopeMeasurement,
    pub z_factor: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            measurement: SlopeMeasurement::Degree,
            z_factor: 1.0,
        }
    }
}

type ComputeFn = dyn Fn(&Record) -> Result<FieldValue, String> + Send + Sync;

/// Typed field calculation: a pure function of one record's existing values.
#[derive(Clone)]
pub struct FieldComputation {
    description: String,
    compute: Arc<ComputeFn>,
}

impl FieldComputation {
    pub fn new<D, F>(description: D, compute: F) -> Self
    where
        D: Into<String>,
        F: Fn(&Record) -> Result<FieldValue, String> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            compute: Arc::new(compute),
        }
    }

    /// Same value for every record
    pub fn constant<V: Into<FieldValue>>(value: V) -> Self {
        let value = value.into();
        let description = format!("constant '{value}'");
        Self::new(description, move |_| Ok(value.clone()))
    }

    pub fn evaluate(&self, record: &Record) -> Result<FieldValue, String> {
        (self.compute)(record)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for FieldComputation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldComputation")
            .field("description", &self.description)
            .finish()
    }
}
