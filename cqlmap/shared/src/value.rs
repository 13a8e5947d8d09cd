//! CQL value representation
//!
//! `CqlValue` is the tagged variant every bound argument, patch entry and
//! scanned column travels as. Conversion to and from JSON backs the wire
//! statement envelope.

use crate::error::{MapperError, MapperResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Ordered field-name to value mapping used for patches, composite keys and
/// map-oriented scans
pub type FieldMap = BTreeMap<String, CqlValue>;

/// CQL value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CqlValue {
    Null,
    Boolean(bool),
    Tinyint(i8),
    Smallint(i16),
    Int(i32),
    Bigint(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    List(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
}

impl CqlValue {
    /// Name of the variant, used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::Tinyint(_) => "tinyint",
            CqlValue::Smallint(_) => "smallint",
            CqlValue::Int(_) => "int",
            CqlValue::Bigint(_) => "bigint",
            CqlValue::Float(_) => "float",
            CqlValue::Double(_) => "double",
            CqlValue::Text(_) => "text",
            CqlValue::Blob(_) => "blob",
            CqlValue::Timestamp(_) => "timestamp",
            CqlValue::Uuid(_) => "uuid",
            CqlValue::List(_) => "list",
            CqlValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    /// Widen any signed integer variant to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CqlValue::Tinyint(v) => Some(i64::from(*v)),
            CqlValue::Smallint(v) => Some(i64::from(*v)),
            CqlValue::Int(v) => Some(i64::from(*v)),
            CqlValue::Bigint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality that treats integer widths (and float widths) as one domain,
    /// the way the store compares a literal `5` with a stored `int`.
    pub fn loosely_equals(&self, other: &CqlValue) -> bool {
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            return a == b;
        }
        match (self, other) {
            (CqlValue::Float(a), CqlValue::Double(b)) | (CqlValue::Double(b), CqlValue::Float(a)) => {
                f64::from(*a) == *b
            }
            _ => self == other,
        }
    }

    /// Convert a JSON value into a CQL value
    pub fn from_json(value: serde_json::Value) -> CqlValue {
        match value {
            serde_json::Value::Null => CqlValue::Null,
            serde_json::Value::Bool(b) => CqlValue::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => CqlValue::Bigint(i),
                None => CqlValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => CqlValue::Text(s),
            serde_json::Value::Array(items) => {
                CqlValue::List(items.into_iter().map(CqlValue::from_json).collect())
            }
            serde_json::Value::Object(entries) => CqlValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (CqlValue::Text(k), CqlValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert a CQL value into JSON; blobs become hex text, timestamps RFC 3339
    pub fn to_json(&self) -> MapperResult<serde_json::Value> {
        Ok(match self {
            CqlValue::Null => serde_json::Value::Null,
            CqlValue::Boolean(b) => serde_json::Value::Bool(*b),
            CqlValue::Tinyint(_) | CqlValue::Smallint(_) | CqlValue::Int(_) | CqlValue::Bigint(_) => {
                serde_json::Value::from(self.as_i64().unwrap_or_default())
            }
            CqlValue::Float(f) => float_to_json(f64::from(*f))?,
            CqlValue::Double(f) => float_to_json(*f)?,
            CqlValue::Text(s) => serde_json::Value::String(s.clone()),
            CqlValue::Blob(bytes) => serde_json::Value::String(hex::encode(bytes)),
            CqlValue::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            CqlValue::Uuid(id) => serde_json::Value::String(id.to_string()),
            CqlValue::List(items) => serde_json::Value::Array(
                items.iter().map(CqlValue::to_json).collect::<MapperResult<Vec<_>>>()?,
            ),
            CqlValue::Map(entries) => {
                let mut object = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match key {
                        CqlValue::Text(s) => s.clone(),
                        other => other.to_string(),
                    };
                    object.insert(key, value.to_json()?);
                }
                serde_json::Value::Object(object)
            }
        })
    }
}

fn float_to_json(f: f64) -> MapperResult<serde_json::Value> {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .ok_or_else(|| MapperError::conversion(format!("{f} has no JSON representation")))
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Null => write!(f, "null"),
            CqlValue::Boolean(b) => write!(f, "{b}"),
            CqlValue::Tinyint(v) => write!(f, "{v}"),
            CqlValue::Smallint(v) => write!(f, "{v}"),
            CqlValue::Int(v) => write!(f, "{v}"),
            CqlValue::Bigint(v) => write!(f, "{v}"),
            CqlValue::Float(v) => write!(f, "{v}"),
            CqlValue::Double(v) => write!(f, "{v}"),
            CqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            CqlValue::Blob(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            CqlValue::Timestamp(ts) => write!(f, "'{}'", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            CqlValue::Uuid(id) => write!(f, "{id}"),
            CqlValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            CqlValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for CqlValue {
    fn from(s: &str) -> Self {
        CqlValue::Text(s.to_string())
    }
}

impl From<String> for CqlValue {
    fn from(s: String) -> Self {
        CqlValue::Text(s)
    }
}

impl From<bool> for CqlValue {
    fn from(b: bool) -> Self {
        CqlValue::Boolean(b)
    }
}

impl From<i32> for CqlValue {
    fn from(v: i32) -> Self {
        CqlValue::Int(v)
    }
}

impl From<i64> for CqlValue {
    fn from(v: i64) -> Self {
        CqlValue::Bigint(v)
    }
}

impl From<f64> for CqlValue {
    fn from(v: f64) -> Self {
        CqlValue::Double(v)
    }
}

impl From<DateTime<Utc>> for CqlValue {
    fn from(ts: DateTime<Utc>) -> Self {
        CqlValue::Timestamp(ts)
    }
}

impl From<Uuid> for CqlValue {
    fn from(id: Uuid) -> Self {
        CqlValue::Uuid(id)
    }
}

impl From<Vec<u8>> for CqlValue {
    fn from(bytes: Vec<u8>) -> Self {
        CqlValue::Blob(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        let value = CqlValue::from_json(json!({"name": "ann", "age": 42, "tags": ["a"], "x": null}));
        match value {
            CqlValue::Map(entries) => {
                assert!(entries.contains(&(CqlValue::from("age"), CqlValue::Bigint(42))));
                assert!(entries.contains(&(CqlValue::from("x"), CqlValue::Null)));
                assert!(entries.contains(&(
                    CqlValue::from("tags"),
                    CqlValue::List(vec![CqlValue::from("a")])
                )));
            }
            other => panic!("expected map, got {other:?}"),
        }

        assert_eq!(CqlValue::from_json(json!(1.5)), CqlValue::Double(1.5));
    }

    #[test]
    fn test_timestamp_to_json() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        assert_eq!(
            CqlValue::Timestamp(ts).to_json().unwrap(),
            json!("2024-03-01T10:30:00Z")
        );
    }

    #[test]
    fn test_loose_integer_equality() {
        assert!(CqlValue::Int(5).loosely_equals(&CqlValue::Bigint(5)));
        assert!(CqlValue::Tinyint(3).loosely_equals(&CqlValue::Smallint(3)));
        assert!(!CqlValue::Int(5).loosely_equals(&CqlValue::from("5")));
        assert!(CqlValue::from("a").loosely_equals(&CqlValue::from("a")));
    }

    #[test]
    fn test_display_escapes_quotes() {
        assert_eq!(CqlValue::from("it's").to_string(), "'it''s'");
        assert_eq!(CqlValue::Blob(vec![0xab, 0x01]).to_string(), "0xab01");
    }
}
