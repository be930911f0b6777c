//! Observation values
//!
//! Every logged value is a [`LogValue`]: a tagged union over the JSON shapes
//! `null | bool | number | string | array | object`. Unlike
//! `serde_json::Value` it is `Eq + Hash`, so `(key, value)` pairs can key the
//! normalized parameter trees used by run matching.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Numeric observation.
///
/// Equality is total: an integral float equals the int with the same value,
/// `NaN == NaN` and `-0.0 == 0.0`. Hashing agrees with equality.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// Signed integer
    Int(i64),
    /// Floating point
    Float(f64),
}

impl Number {
    /// Value as `f64` (lossy for very large ints).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// Integral floats inside the `i64` range collapse to ints.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn as_exact_int(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            Self::Float(f) => {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Some(f as i64)
                } else {
                    None
                }
            }
        }
    }

    fn canonical_bits(f: f64) -> u64 {
        if f.is_nan() {
            f64::NAN.to_bits()
        } else if f == 0.0 {
            0.0f64.to_bits()
        } else {
            f.to_bits()
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self.as_exact_int(), other.as_exact_int()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => {
                Self::canonical_bits(self.as_f64()) == Self::canonical_bits(other.as_f64())
            }
            _ => false,
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.as_exact_int() {
            Some(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            None => {
                1u8.hash(state);
                Self::canonical_bits(self.as_f64()).hash(state);
            }
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

/// A JSON-compatible observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum LogValue {
    /// JSON `null`
    #[default]
    Null,
    /// JSON boolean
    Bool(bool),
    /// JSON number
    Number(Number),
    /// JSON string
    String(String),
    /// JSON array
    Array(Vec<LogValue>),
    /// JSON object with string keys
    Object(BTreeMap<String, LogValue>),
}

impl LogValue {
    /// Borrow the object map, if this is an object.
    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Numeric value as `f64`, if this is a number.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    /// Borrow the string, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// True for `null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encode as compact JSON text (the persisted form).
    ///
    /// # Errors
    ///
    /// Returns error if a float is not representable in JSON (NaN/inf).
    pub fn to_json_string(&self) -> crate::Result<String> {
        if self.has_non_finite() {
            return Err(crate::Error::validation(format!(
                "value {self} contains a non-finite number"
            )));
        }
        Ok(serde_json::to_string(&serde_json::Value::from(self.clone()))?)
    }

    /// Decode from JSON text.
    ///
    /// # Errors
    ///
    /// Returns error if `text` is not valid JSON.
    pub fn from_json_str(text: &str) -> crate::Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(Self::from(json))
    }

    /// True if a float anywhere in the value is NaN or infinite.
    pub(crate) fn has_non_finite(&self) -> bool {
        match self {
            Self::Number(Number::Float(f)) => !f.is_finite(),
            Self::Array(items) => items.iter().any(Self::has_non_finite),
            Self::Object(map) => map.values().any(Self::has_non_finite),
            _ => false,
        }
    }
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Object(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<serde_json::Value> for LogValue {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || Self::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
                |i| Self::Number(Number::Int(i)),
            ),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<LogValue> for serde_json::Value {
    fn from(value: LogValue) -> Self {
        match value {
            LogValue::Null => Self::Null,
            LogValue::Bool(b) => Self::Bool(b),
            LogValue::Number(Number::Int(i)) => Self::from(i),
            // Non-finite floats have no JSON form
            LogValue::Number(Number::Float(f)) => {
                serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number)
            }
            LogValue::String(s) => Self::String(s),
            LogValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            LogValue::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<bool> for LogValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for LogValue {
    fn from(i: i64) -> Self {
        Self::Number(Number::Int(i))
    }
}

impl From<i32> for LogValue {
    fn from(i: i32) -> Self {
        Self::Number(Number::Int(i64::from(i)))
    }
}

impl From<u32> for LogValue {
    fn from(i: u32) -> Self {
        Self::Number(Number::Int(i64::from(i)))
    }
}

impl From<f64> for LogValue {
    fn from(f: f64) -> Self {
        Self::Number(Number::Float(f))
    }
}

impl From<f32> for LogValue {
    fn from(f: f32) -> Self {
        Self::Number(Number::Float(f64::from(f)))
    }
}

impl From<&str> for LogValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for LogValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Self>> From<Vec<T>> for LogValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Self>> for LogValue {
    fn from(map: BTreeMap<String, Self>) -> Self {
        Self::Object(map)
    }
}

impl<T: Into<Self>> From<Option<T>> for LogValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
