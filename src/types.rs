use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;

/// A single value flowing between the remote relational store and the
/// engine's columnar representation.
///
/// The variants mirror the supported conversion matrix, one per external
/// scalar type plus a recursive array wrapper:
/// ```rust
/// use pg_bridge::Value;
///
/// let row = vec![
///     Value::Int32(1),
///     Value::Text("alice".into()),
///     Value::Array(vec![Value::Int32(2), Value::Null]),
/// ];
/// # let _ = row;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL at any nesting level
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer (smallint)
    Int16(i16),
    /// 32-bit signed integer (integer)
    Int32(i32),
    /// 64-bit signed integer (bigint)
    Int64(i64),
    /// 32-bit unsigned integer (serial, range-reinterpreted)
    UInt32(u32),
    /// 64-bit unsigned integer (bigserial, range-reinterpreted)
    UInt64(u64),
    /// 32-bit float (real)
    Float32(f32),
    /// 64-bit float (double precision)
    Float64(f64),
    /// Variable-length string (text/char/varchar)
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Naive date-time with microsecond precision
    Timestamp(NaiveDateTime),
    /// Time-zone-aware instant; converting zones never shifts the instant
    TimestampTz(DateTime<Utc>),
    /// Fixed-point decimal
    Decimal(Decimal),
    /// One array nesting level; elements may be `Null` when the leaf is nullable
    Array(Vec<Value>),
}

impl Value {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Widening view of any signed or unsigned integer variant.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt32(v) => Some(i64::from(*v)),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Text(s) => Self::bool_from_literal(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(value) => Some(*value),
            Value::TimestampTz(value) => Some(value.naive_utc()),
            _ => None,
        }
    }

    /// Decode the textual boolean forms the external store accepts.
    ///
    /// `TRUE`/`true`/`yes`/`y`/`on`/`1` are true; `FALSE`/`false`/`no`/`n`/
    /// `off`/`0` are false; matching is case-insensitive. Anything else is
    /// not a boolean literal.
    #[must_use]
    pub fn bool_from_literal(s: &str) -> Option<bool> {
        match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}
