use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};

use crate::error::PgBridgeError;
use crate::schema::{ColumnDescriptor, ExternalType};
use crate::types::Value;

type BoxError = Box<dyn Error + Sync + Send>;

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Value, BoxError> {
        match ty.kind() {
            Kind::Array(element) => decode_array(element, raw),
            _ => decode_scalar(ty, raw),
        }
    }

    fn from_sql_null(_ty: &Type) -> Result<Value, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(ty: &Type) -> bool {
        match ty.kind() {
            Kind::Array(element) => scalar_accepted(element),
            _ => scalar_accepted(ty),
        }
    }
}

fn scalar_accepted(ty: &Type) -> bool {
    matches!(
        ty.name(),
        "int2"
            | "int4"
            | "int8"
            | "float4"
            | "float8"
            | "bool"
            | "date"
            | "timestamp"
            | "timestamptz"
            | "numeric"
            | "text"
            | "varchar"
            | "bpchar"
            | "name"
    )
}

fn decode_scalar(ty: &Type, raw: &[u8]) -> Result<Value, BoxError> {
    match ty.name() {
        "int2" => i16::from_sql(ty, raw).map(Value::Int16),
        "int4" => i32::from_sql(ty, raw).map(Value::Int32),
        "int8" => i64::from_sql(ty, raw).map(Value::Int64),
        "float4" => f32::from_sql(ty, raw).map(Value::Float32),
        "float8" => f64::from_sql(ty, raw).map(Value::Float64),
        "bool" => bool::from_sql(ty, raw).map(Value::Bool),
        "date" => NaiveDate::from_sql(ty, raw).map(Value::Date),
        "timestamp" => NaiveDateTime::from_sql(ty, raw).map(Value::Timestamp),
        "timestamptz" => DateTime::<Utc>::from_sql(ty, raw).map(Value::TimestampTz),
        "numeric" => Decimal::from_sql(ty, raw).map(Value::Decimal),
        "text" | "varchar" | "bpchar" | "name" => String::from_sql(ty, raw).map(Value::Text),
        other => Err(format!("cannot decode PostgreSQL type '{other}'").into()),
    }
}

/// Parse the binary array wire format: a header with the dimension count,
/// per-dimension lengths, then the elements flattened row-major. A NULL
/// element (length -1) becomes `Value::Null` at its position; a zero-
/// dimension header is the empty array.
fn decode_array(element: &Type, raw: &[u8]) -> Result<Value, BoxError> {
    let mut buf = raw;
    let ndims = read_i32(&mut buf)?;
    let _has_nulls = read_i32(&mut buf)?;
    let _element_oid = read_i32(&mut buf)?;

    if ndims == 0 {
        return Ok(Value::Array(Vec::new()));
    }
    if !(1..=16).contains(&ndims) {
        return Err(format!("invalid array dimension count {ndims}").into());
    }

    let mut dims = Vec::with_capacity(ndims as usize);
    for _ in 0..ndims {
        let len = read_i32(&mut buf)?;
        let _lower_bound = read_i32(&mut buf)?;
        if len < 0 {
            return Err(format!("negative array dimension length {len}").into());
        }
        dims.push(len as usize);
    }

    let total: usize = dims.iter().product();
    let mut flat = Vec::with_capacity(total);
    for _ in 0..total {
        let len = read_i32(&mut buf)?;
        if len < 0 {
            flat.push(Value::Null);
        } else {
            let len = len as usize;
            if buf.len() < len {
                return Err("truncated array element".into());
            }
            let (chunk, rest) = buf.split_at(len);
            flat.push(decode_scalar(element, chunk)?);
            buf = rest;
        }
    }

    let mut iter = flat.into_iter();
    Ok(reshape(&dims, &mut iter))
}

fn reshape(dims: &[usize], flat: &mut impl Iterator<Item = Value>) -> Value {
    match dims.split_first() {
        Some((&n, rest)) if rest.is_empty() => Value::Array(flat.by_ref().take(n).collect()),
        Some((&n, rest)) => Value::Array((0..n).map(|_| reshape(rest, flat)).collect()),
        None => Value::Array(Vec::new()),
    }
}

fn read_i32(buf: &mut &[u8]) -> Result<i32, BoxError> {
    if buf.len() < 4 {
        return Err("truncated array header".into());
    }
    let (head, rest) = buf.split_at(4);
    *buf = rest;
    Ok(i32::from_be_bytes([head[0], head[1], head[2], head[3]]))
}

/// Decode one remote row into internal values per the descriptor set.
///
/// # Errors
/// Returns a `ConversionError` naming the column for any value that does
/// not fit its mapped internal type.
pub(crate) fn decode_row(
    row: &Row,
    columns: &[ColumnDescriptor],
) -> Result<Vec<Value>, PgBridgeError> {
    let mut values = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value: Value = row.try_get(idx).map_err(|e| PgBridgeError::ConversionError {
            column: column.name.clone(),
            reason: e.to_string(),
        })?;
        values.push(adapt_value(value, column)?);
    }
    Ok(values)
}

/// Reinterpret a decoded value per the resolved descriptor: serial columns
/// become unsigned (range-checked), textual booleans decode their literal
/// forms, arrays recurse element-wise.
pub(crate) fn adapt_value(
    value: Value,
    column: &ColumnDescriptor,
) -> Result<Value, PgBridgeError> {
    adapt_leaf(value, column.external).map_err(|reason| PgBridgeError::ConversionError {
        column: column.name.clone(),
        reason,
    })
}

fn adapt_leaf(value: Value, external: ExternalType) -> Result<Value, String> {
    match (external, value) {
        (_, Value::Array(items)) => items
            .into_iter()
            .map(|item| adapt_leaf(item, external))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (ExternalType::Serial, Value::Int32(v)) => u32::try_from(v)
            .map(Value::UInt32)
            .map_err(|_| format!("serial value {v} out of unsigned range")),
        (ExternalType::BigSerial, Value::Int64(v)) => u64::try_from(v)
            .map(Value::UInt64)
            .map_err(|_| format!("bigserial value {v} out of unsigned range")),
        (ExternalType::Boolean, Value::Text(s)) => Value::bool_from_literal(&s)
            .map(Value::Bool)
            .ok_or_else(|| format!("'{s}' is not a boolean literal")),
        (_, value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int4_array_payload(dims: &[(i32, i32)], elements: &[Option<i32>]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(dims.len() as i32).to_be_bytes());
        let has_nulls = i32::from(elements.iter().any(Option::is_none));
        raw.extend_from_slice(&has_nulls.to_be_bytes());
        raw.extend_from_slice(&23i32.to_be_bytes()); // int4 oid
        for (len, lower) in dims {
            raw.extend_from_slice(&len.to_be_bytes());
            raw.extend_from_slice(&lower.to_be_bytes());
        }
        for element in elements {
            match element {
                Some(v) => {
                    raw.extend_from_slice(&4i32.to_be_bytes());
                    raw.extend_from_slice(&v.to_be_bytes());
                }
                None => raw.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        raw
    }

    #[test]
    fn decodes_two_dimensional_array_with_nulls() {
        let raw = int4_array_payload(&[(2, 1), (2, 1)], &[Some(1), None, Some(3), Some(4)]);
        let value = decode_array(&Type::INT4, &raw).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Array(vec![Value::Int32(1), Value::Null]),
                Value::Array(vec![Value::Int32(3), Value::Int32(4)]),
            ])
        );
    }

    #[test]
    fn decodes_empty_array() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&23i32.to_be_bytes());
        assert_eq!(
            decode_array(&Type::INT4, &raw).unwrap(),
            Value::Array(Vec::new())
        );
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut raw = int4_array_payload(&[(2, 1)], &[Some(1), Some(2)]);
        raw.truncate(raw.len() - 3);
        assert!(decode_array(&Type::INT4, &raw).is_err());
    }

    #[test]
    fn serial_values_reinterpret_as_unsigned() {
        let column = ColumnDescriptor::new("id".to_string(), ExternalType::Serial, 0, false);
        assert_eq!(
            adapt_value(Value::Int32(i32::MAX), &column).unwrap(),
            Value::UInt32(2_147_483_647)
        );
        let err = adapt_value(Value::Int32(-5), &column).unwrap_err();
        assert!(matches!(
            err,
            PgBridgeError::ConversionError { ref column, .. } if column == "id"
        ));
    }

    #[test]
    fn textual_booleans_adapt_by_literal() {
        let column = ColumnDescriptor::new("flag".to_string(), ExternalType::Boolean, 0, true);
        assert_eq!(
            adapt_value(Value::Text("yes".to_string()), &column).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            adapt_value(Value::Text("off".to_string()), &column).unwrap(),
            Value::Bool(false)
        );
        assert!(adapt_value(Value::Text("2".to_string()), &column).is_err());
    }

    #[test]
    fn array_adaptation_recurses_to_leaves() {
        let column = ColumnDescriptor::new("ids".to_string(), ExternalType::Serial, 1, false);
        let value = Value::Array(vec![Value::Int32(1), Value::Null, Value::Int32(2)]);
        assert_eq!(
            adapt_value(value, &column).unwrap(),
            Value::Array(vec![Value::UInt32(1), Value::Null, Value::UInt32(2)])
        );
    }
}
