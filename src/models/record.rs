use crate::constants::fields;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One attribute value of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Double(f64),
    Date(NaiveDateTime),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Null | Self::Date(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Text(text) => write!(f, "{text}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// One row of a feature class or table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub object_id: i64,
    pub values: BTreeMap<String, FieldValue>,
    /// Geometry area in square meters, when the row has a polygon geometry
    pub shape_area: Option<f64>,
}

impl Record {
    pub fn new(object_id: i64) -> Self {
        Self {
            object_id,
            ..Default::default()
        }
    }

    pub fn with_value<F: Into<String>, V: Into<FieldValue>>(mut self, field: F, value: V) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn with_area(mut self, square_meters: f64) -> Self {
        self.shape_area = Some(square_meters);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Numeric value of `field`; `Shape_Area` falls back to the geometry area
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.values.get(field).and_then(FieldValue::as_f64) {
            Some(value) => Some(value),
            None if field == fields::SHAPE_AREA => self.shape_area,
            None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Text,
    Double,
    Integer,
    Date,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Double => write!(f, "DOUBLE"),
            Self::Integer => write!(f, "LONG"),
            Self::Date => write!(f, "DATE"),
        }
    }
}

/// Definition of a field to add to a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn text<S: Into<String>>(name: S, length: u32) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
            length: Some(length),
            precision: None,
            nullable: true,
        }
    }

    pub fn double<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Double,
            length: None,
            precision: None,
            nullable: true,
        }
    }

    pub fn date<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Date,
            length: None,
            precision: None,
            nullable: true,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn non_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }
}
