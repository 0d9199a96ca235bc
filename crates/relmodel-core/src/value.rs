//! Dynamic values and logical value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically-typed value read from or bound to the store.
///
/// `Value::Null` is the store's null sentinel. An absent value (`None` where an
/// `Option<Value>` is accepted) is normalized to `Value::Null` when it is bound
/// to a parameter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// Decimal kept as its canonical string form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// Days since the Unix epoch.
    Date(i32),
    /// Microseconds since midnight.
    Time(i64),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// Microseconds since the Unix epoch, UTC.
    TimestampTz(i64),
    Uuid([u8; 16]),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    /// Check whether this is the null sentinel.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime type of this value. `None` for the null sentinel.
    pub fn value_type(&self) -> Option<ValueType> {
        let ty = match self {
            Value::Null => return None,
            Value::Bool(_) => ValueType::Bool,
            Value::TinyInt(_) => ValueType::TinyInt,
            Value::SmallInt(_) => ValueType::SmallInt,
            Value::Int(_) => ValueType::Int,
            Value::BigInt(_) => ValueType::BigInt,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Decimal(_) => ValueType::Decimal,
            Value::Text(_) => ValueType::Text,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Date(_) => ValueType::Date,
            Value::Time(_) => ValueType::Time,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::TimestampTz(_) => ValueType::TimestampTz,
            Value::Uuid(_) => ValueType::Uuid,
            Value::Json(_) => ValueType::Json,
            Value::Array(_) => ValueType::Array,
        };
        Some(ty)
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Widen any integer variant to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Length in characters (text) or bytes (binary). Used to size
    /// bounded-length parameters.
    pub fn storage_length(&self) -> Option<usize> {
        match self {
            Value::Text(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Logical type of a column or value, independent of any store.
///
/// `Enum` and `Nullable` wrap another type; resolvers unwrap them to find the
/// representation that is actually stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    Array,
    /// A named enumeration stored as its underlying integral type.
    Enum {
        name: String,
        underlying: Box<ValueType>,
    },
    /// An optional value of the inner type.
    Nullable(Box<ValueType>),
    /// An application type with no built-in representation.
    Custom(String),
}

impl ValueType {
    /// Nullable wrapper around `inner`.
    pub fn nullable(inner: ValueType) -> Self {
        ValueType::Nullable(Box::new(inner))
    }

    /// Enumeration named `name` stored as `underlying`.
    pub fn enumeration(name: impl Into<String>, underlying: ValueType) -> Self {
        ValueType::Enum {
            name: name.into(),
            underlying: Box::new(underlying),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueType::Nullable(_))
    }

    /// Replace an enumeration with its underlying type.
    ///
    /// Nullability is preserved: `Nullable(Enum(i32))` becomes `Nullable(i32)`.
    pub fn unwrap_enum(&self) -> ValueType {
        match self {
            ValueType::Enum { underlying, .. } => underlying.unwrap_enum(),
            ValueType::Nullable(inner) => match inner.as_ref() {
                ValueType::Enum { .. } => ValueType::Nullable(Box::new(inner.unwrap_enum())),
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Strip a `Nullable` wrapper, if any.
    pub fn unwrap_nullable(&self) -> ValueType {
        match self {
            ValueType::Nullable(inner) => inner.as_ref().clone(),
            _ => self.clone(),
        }
    }

    /// Whether a value of this type may hold `value`.
    ///
    /// The null sentinel is accepted by every type; callers that care about
    /// nullability check it separately.
    pub fn accepts(&self, value: &Value) -> bool {
        match value.value_type() {
            None => true,
            Some(actual) => actual == self.unwrap_enum().unwrap_nullable(),
        }
    }

    /// Human readable name used in error messages.
    pub fn name(&self) -> String {
        match self {
            ValueType::Bool => "bool".to_string(),
            ValueType::TinyInt => "i8".to_string(),
            ValueType::SmallInt => "i16".to_string(),
            ValueType::Int => "i32".to_string(),
            ValueType::BigInt => "i64".to_string(),
            ValueType::Float => "f32".to_string(),
            ValueType::Double => "f64".to_string(),
            ValueType::Decimal => "decimal".to_string(),
            ValueType::Text => "String".to_string(),
            ValueType::Bytes => "Vec<u8>".to_string(),
            ValueType::Date => "date".to_string(),
            ValueType::Time => "time".to_string(),
            ValueType::Timestamp => "timestamp".to_string(),
            ValueType::TimestampTz => "timestamptz".to_string(),
            ValueType::Uuid => "uuid".to_string(),
            ValueType::Json => "json".to_string(),
            ValueType::Array => "array".to_string(),
            ValueType::Enum { name, .. } => name.clone(),
            ValueType::Nullable(inner) => format!("Option<{}>", inner.name()),
            ValueType::Custom(name) => name.clone(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
