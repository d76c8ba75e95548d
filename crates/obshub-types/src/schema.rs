//! Record schemas and the values records are made of.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The type of one field in a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// A timestamp. The first time field of a record is its phenomenon time.
    Time,
    /// A measured quantity with a unit of measure.
    Quantity { uom: String },
    Count,
    Boolean,
    Text,
    Category,
}

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    /// URI of the observed property this field carries.
    pub definition: String,
    pub kind: FieldKind,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, definition: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            kind,
        }
    }
}

/// Describes the records produced by one output.
///
/// Two schemas are the same version of a datastream only if they are equal
/// field by field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Index of the first [`FieldKind::Time`] field, if any.
    pub fn time_field_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.kind == FieldKind::Time)
    }

    /// Definitions of the non-time fields, i.e. the observed properties.
    pub fn observed_properties(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.kind != FieldKind::Time)
            .map(|f| f.definition.as_str())
    }
}

/// How records of a datastream are serialised on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordEncoding {
    #[default]
    Json,
    Text {
        token_separator: String,
        block_separator: String,
    },
    Binary,
}

/// A single value within a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    Time(DateTime<Utc>),
    Double(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl DataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            DataValue::Double(v) => Some(v),
            DataValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }
}

/// Locates the phenomenon time inside records of one schema.
///
/// Built once per datastream so the field lookup is not repeated for every
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeExtractor {
    index: Option<usize>,
}

impl TimeExtractor {
    pub fn for_schema(schema: &RecordSchema) -> Self {
        Self {
            index: schema.time_field_index(),
        }
    }

    /// Whether the schema declares a time field at all.
    pub fn has_time_field(&self) -> bool {
        self.index.is_some()
    }

    /// Reads the phenomenon time of `record`.
    ///
    /// Numeric values are read as seconds since the Unix epoch. Returns
    /// `None` if the schema has no time field or the value is missing or
    /// unusable.
    pub fn extract(&self, record: &[DataValue]) -> Option<DateTime<Utc>> {
        match record.get(self.index?)? {
            DataValue::Time(t) => Some(*t),
            DataValue::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
            DataValue::Double(secs) if secs.is_finite() => {
                DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
            }
            _ => None,
        }
    }
}
