//! Typed column values and their semantic types.

use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};

use crate::errors::EntGraphError;

/// Semantic type of a column, as declared by the entity schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Json,
    Enum,
    Uuid,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Int)
    }

    /// Whether `value` can be stored in a column of this type.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::Json, _) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Int, Value::Int(_)) => true,
            (FieldType::Float, Value::Float(_) | Value::Int(_)) => true,
            (FieldType::String | FieldType::Enum | FieldType::Uuid, Value::Text(_)) => true,
            (FieldType::Bytes, Value::Bytes(_)) => true,
            _ => false,
        }
    }

    /// The value as bound for a column of this type. Json columns store any
    /// non-null value JSON-encoded, so a plain string reads back as a JSON
    /// string.
    pub fn encode(self, value: &Value) -> Result<Value, EntGraphError> {
        match (self, value) {
            (FieldType::Json, Value::Null | Value::Json(_)) => Ok(value.clone()),
            (FieldType::Json, _) => Ok(Value::Json(value.to_json()?)),
            _ => Ok(value.clone()),
        }
    }

    /// Decode a stored value according to this type.
    pub fn decode(self, raw: ValueRef<'_>) -> Result<Value, EntGraphError> {
        let value = match (self, raw) {
            (_, ValueRef::Null) => Value::Null,
            (FieldType::Bool, ValueRef::Integer(i)) => Value::Bool(i != 0),
            (FieldType::Float, ValueRef::Integer(i)) => Value::Float(i as f64),
            (FieldType::Json, ValueRef::Text(text)) => {
                Value::Json(serde_json::from_slice(text)?)
            }
            (_, ValueRef::Integer(i)) => Value::Int(i),
            (_, ValueRef::Real(f)) => Value::Float(f),
            (_, ValueRef::Text(text)) => Value::Text(String::from_utf8_lossy(text).into_owned()),
            (_, ValueRef::Blob(blob)) => Value::Bytes(blob.to_vec()),
        };
        Ok(value)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Json => "json",
            FieldType::Enum => "enum",
            FieldType::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// A column value handed to or read back from the store.
///
/// Serializes untagged, so records render as plain JSON. There is no
/// `Deserialize`: the untagged form cannot tell `Bytes` from a JSON array.
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

/// Hashable identity of a node, used to key in-memory merges.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// JSON form of the value. Bytes become an array of numbers.
    pub fn to_json(&self) -> Result<serde_json::Value, EntGraphError> {
        let json = match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    EntGraphError::validation("json", format!("{x} is not a JSON number"))
                })?,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::from(b.clone()),
            Value::Json(j) => j.clone(),
        };
        Ok(json)
    }

    /// Identity key for ID-like values; `None` for nulls, floats and JSON.
    pub fn key(&self) -> Option<NodeKey> {
        match self {
            Value::Int(i) => Some(NodeKey::Int(*i)),
            Value::Bool(b) => Some(NodeKey::Int(i64::from(*b))),
            Value::Text(s) => Some(NodeKey::Text(s.clone())),
            Value::Bytes(b) => Some(NodeKey::Bytes(b.clone())),
            Value::Null | Value::Float(_) | Value::Json(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(x) => ToSqlOutput::Owned(SqlValue::Real(*x)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Json(j) => ToSqlOutput::Owned(SqlValue::Text(
                serde_json::to_string(j)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            )),
        };
        Ok(out)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

/// Untyped read, for columns without a declared [`FieldType`].
impl From<ValueRef<'_>> for Value {
    fn from(raw: ValueRef<'_>) -> Self {
        match raw {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
            ValueRef::Blob(blob) => Value::Bytes(blob.to_vec()),
        }
    }
}
