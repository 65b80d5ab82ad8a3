//! Attribute values held by entities.
//!
//! Values cover the scalar shapes a decoded payload can produce, plus
//! timestamps and opaque structured JSON for attributes that keep a
//! nested document as-is.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scalar attribute value.
///
/// # Examples
///
/// ```
/// use modelsync::Value;
///
/// let id = Value::Int(42);
/// let name = Value::String("alice".to_string());
///
/// assert!(id.is_int());
/// assert_eq!(name.as_string(), Some("alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Json(_) => "json",
        }
    }

    /// Equality that treats `Int(n)` and `Float(n.0)` as the same number.
    ///
    /// Payload decoders are free to hand back either shape for integral
    /// numbers, so identity lookups and predicates compare with this.
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => {
                #[allow(clippy::cast_precision_loss)]
                let a = *a as f64;
                a == *b
            }
            _ => self == other,
        }
    }

    /// Canonical hashable key for identity caching. `None` for null.
    ///
    /// Keys agree whenever [`Value::equivalent`] holds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn identity_key(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(format!("bool:{v}")),
            Self::Int(v) => Some(format!("num:{v}")),
            Self::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some(format!("num:{}", *v as i64))
            }
            Self::Float(v) => Some(format!("num:{v}")),
            Self::String(v) => Some(format!("str:{v}")),
            Self::DateTime(v) => Some(format!("dt:{}", v.to_rfc3339())),
            Self::Json(v) => Some(format!("json:{v}")),
        }
    }

    /// Converts a scalar JSON value. Arrays and objects become [`Value::Json`].
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            serde_json::Value::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }

    /// Converts back to JSON for outgoing payloads.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(v) => serde_json::Value::String(v.clone()),
            Self::DateTime(v) => serde_json::Value::String(v.to_rfc3339()),
            Self::Json(v) => v.clone(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
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

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

/// The shape a mapped attribute is declared to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Any,
    Bool,
    Int,
    Float,
    String,
    DateTime,
    Json,
}

impl AttributeKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Json => "json",
        }
    }

    /// Coerces a decoded value into this kind.
    ///
    /// Null is accepted for every kind. Integers widen to floats and RFC 3339
    /// strings parse into timestamps; everything else must already match.
    /// On mismatch the decoded value's type name is returned.
    pub fn coerce(self, value: Value) -> Result<Value, &'static str> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Any, v) => Ok(v),
            (Self::Bool, v @ Value::Bool(_))
            | (Self::Int, v @ Value::Int(_))
            | (Self::Float, v @ Value::Float(_))
            | (Self::String, v @ Value::String(_))
            | (Self::DateTime, v @ Value::DateTime(_)) => Ok(v),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (Self::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| "string"),
            (Self::Json, v) => Ok(Value::Json(v.to_json())),
            (_, v) => Err(v.type_name()),
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
