//! The dynamic value type.

use crate::value::Blob;
use chrono::{DateTime, Utc};
use std::fmt;

/// Type tag for a [`Value`].
///
/// Requests advertise the kind of value they resolve to, and the binary
/// codec uses the same tags on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    Boolean,
    Integer,
    Float,
    String,
    Blob,
    Datetime,
    Array,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Blob => "blob",
            Self::Datetime => "datetime",
            Self::Array => "array",
            Self::Map => "map",
        };
        write!(f, "{}", name)
    }
}

/// A self-describing dynamic value.
///
/// Maps preserve insertion order but compare as unordered sets of unique
/// key/value pairs. Datetimes carry UTC millisecond precision.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Blob),
    Datetime(DateTime<Utc>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Returns the type tag for this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Nil => ValueKind::Nil,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Blob(_) => ValueKind::Blob,
            Self::Datetime(_) => ValueKind::Datetime,
            Self::Array(_) => ValueKind::Array,
            Self::Map(_) => ValueKind::Map,
        }
    }

    /// Approximate deep size in bytes, used for cache accounting.
    pub fn size_estimate(&self) -> usize {
        const BASE: usize = std::mem::size_of::<Value>();
        match self {
            Self::Nil | Self::Boolean(_) | Self::Integer(_) | Self::Float(_)
            | Self::Datetime(_) => BASE,
            Self::String(s) => BASE + s.len(),
            Self::Blob(b) => BASE + b.len(),
            Self::Array(items) => {
                BASE + items.iter().map(Value::size_estimate).sum::<usize>()
            }
            Self::Map(entries) => {
                BASE + entries
                    .iter()
                    .map(|(k, v)| k.size_estimate() + v.size_estimate())
                    .sum::<usize>()
            }
        }
    }

    /// Exact structural identity, used by fingerprint comparison.
    ///
    /// Unlike `==`, floats compare bitwise (so NaN is identical to itself
    /// and the comparison is a proper equivalence). Maps still compare
    /// unordered.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Blob(a), Self::Blob(b)) => a == b,
            (Self::Datetime(a), Self::Datetime(b)) => {
                a.timestamp_millis() == b.timestamp_millis()
            }
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
            }
            (Self::Map(a), Self::Map(b)) => unordered_entries_match(a, b, Value::identical),
            _ => false,
        }
    }
}

/// Structural equality; maps compare as unordered sets of unique entries.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Blob(a), Self::Blob(b)) => a == b,
            (Self::Datetime(a), Self::Datetime(b)) => {
                a.timestamp_millis() == b.timestamp_millis()
            }
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => unordered_entries_match(a, b, Value::eq),
            _ => false,
        }
    }
}

fn unordered_entries_match(
    a: &[(Value, Value)],
    b: &[(Value, Value)],
    eq: fn(&Value, &Value) -> bool,
) -> bool {
    a.len() == b.len()
        && a.iter().all(|(ka, va)| {
            b.iter().any(|(kb, vb)| eq(ka, kb) && eq(va, vb))
        })
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Blob> for Value {
    fn from(v: Blob) -> Self {
        Self::Blob(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Datetime(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}
