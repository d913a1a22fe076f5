// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Measurement types.
//!
//! A [`Metric`] is one measurement as seen by the output side: a name, a
//! sorted tag set, sorted fields and a UTC timestamp. Sorted maps keep the
//! rendered output independent of the order in which fields were collected.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag set of a measurement.
pub type Tags = BTreeMap<String, String>;

/// Field set of a measurement.
pub type Fields = BTreeMap<String, FieldValue>;

// =============================================================================
// FieldValue
// =============================================================================

/// A scalar field value.
///
/// Integer variants keep the width and signedness of the source so outputs
/// that care (line protocol `i`/`u` suffixes, typed columns) can honor it.
/// Date-time values arrive here already rendered as RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value
    Bool(bool),
    /// Signed 8-bit integer
    Int8(i8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
}

impl FieldValue {
    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int8(_) => "int8",
            FieldValue::Int16(_) => "int16",
            FieldValue::Int32(_) => "int32",
            FieldValue::Int64(_) => "int64",
            FieldValue::UInt8(_) => "uint8",
            FieldValue::UInt16(_) => "uint16",
            FieldValue::UInt32(_) => "uint32",
            FieldValue::UInt64(_) => "uint64",
            FieldValue::Float32(_) => "float32",
            FieldValue::Float64(_) => "float64",
            FieldValue::String(_) => "string",
        }
    }

    /// Widens any numeric variant to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int8(v) => Some(*v as f64),
            FieldValue::Int16(v) => Some(*v as f64),
            FieldValue::Int32(v) => Some(*v as f64),
            FieldValue::Int64(v) => Some(*v as f64),
            FieldValue::UInt8(v) => Some(*v as f64),
            FieldValue::UInt16(v) => Some(*v as f64),
            FieldValue::UInt32(v) => Some(*v as f64),
            FieldValue::UInt64(v) => Some(*v as f64),
            FieldValue::Float32(v) => Some(*v as f64),
            FieldValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int8(v) => write!(f, "{}", v),
            FieldValue::Int16(v) => write!(f, "{}", v),
            FieldValue::Int32(v) => write!(f, "{}", v),
            FieldValue::Int64(v) => write!(f, "{}", v),
            FieldValue::UInt8(v) => write!(f, "{}", v),
            FieldValue::UInt16(v) => write!(f, "{}", v),
            FieldValue::UInt32(v) => write!(f, "{}", v),
            FieldValue::UInt64(v) => write!(f, "{}", v),
            FieldValue::Float32(v) => write!(f, "{}", v),
            FieldValue::Float64(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_for_field_value {
    ($variant:ident, $type:ty) => {
        impl From<$type> for FieldValue {
            fn from(v: $type) -> Self {
                FieldValue::$variant(v)
            }
        }
    };
}

impl_from_for_field_value!(Bool, bool);
impl_from_for_field_value!(Int8, i8);
impl_from_for_field_value!(Int16, i16);
impl_from_for_field_value!(Int32, i32);
impl_from_for_field_value!(Int64, i64);
impl_from_for_field_value!(UInt8, u8);
impl_from_for_field_value!(UInt16, u16);
impl_from_for_field_value!(UInt32, u32);
impl_from_for_field_value!(UInt64, u64);
impl_from_for_field_value!(Float32, f32);
impl_from_for_field_value!(Float64, f64);
impl_from_for_field_value!(String, String);

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

// =============================================================================
// Metric
// =============================================================================

/// One measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Measurement name.
    pub name: String,
    /// Tag set.
    pub tags: Tags,
    /// Field set; never empty for metrics produced by an input.
    pub fields: Fields,
    /// Measurement timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    /// Creates a metric.
    pub fn new(name: impl Into<String>, tags: Tags, fields: Fields, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            tags,
            fields,
            timestamp,
        }
    }

    /// Returns a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns a tag by key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Renders the metric as a single-line JSON document.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_types() {
        assert_eq!(FieldValue::Bool(true).type_name(), "bool");
        assert_eq!(FieldValue::Int32(42).type_name(), "int32");
        assert_eq!(FieldValue::UInt64(7).type_name(), "uint64");
        assert_eq!(FieldValue::String("x".into()).type_name(), "string");
    }

    #[test]
    fn test_field_value_as_f64() {
        assert_eq!(FieldValue::Int16(-3).as_f64(), Some(-3.0));
        assert_eq!(FieldValue::Float64(2.5).as_f64(), Some(2.5));
        assert_eq!(FieldValue::Bool(true).as_f64(), None);
        assert_eq!(FieldValue::from("a").as_str(), Some("a"));
    }

    #[test]
    fn test_metric_json_line_is_untagged() {
        let mut tags = Tags::new();
        tags.insert("site".into(), "north".into());
        let mut fields = Fields::new();
        fields.insert("count".into(), FieldValue::UInt32(3));
        fields.insert("ok".into(), FieldValue::Bool(true));

        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let metric = Metric::new("plant", tags, fields, ts);

        let line = metric.to_json_line().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["name"], "plant");
        assert_eq!(parsed["tags"]["site"], "north");
        assert_eq!(parsed["fields"]["count"], 3);
        assert_eq!(parsed["fields"]["ok"], true);
        assert_eq!(metric.tag("site"), Some("north"));
    }
}
