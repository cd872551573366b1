use std::error::Error;

use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};
use tokio_util::bytes::{BufMut, BytesMut};

use crate::types::Value;

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int16(v) => encode_integer(i64::from(*v), ty, out),
            Value::Int32(v) => encode_integer(i64::from(*v), ty, out),
            Value::Int64(v) => encode_integer(*v, ty, out),
            Value::UInt32(v) => encode_integer(i64::from(*v), ty, out),
            Value::UInt64(v) => {
                let v = i64::try_from(*v)
                    .map_err(|_| format!("value {v} out of range for {}", ty.name()))?;
                encode_integer(v, ty, out)
            }
            Value::Float32(v) => match ty.name() {
                "float8" => f64::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Float64(v) => match ty.name() {
                "float4" => (*v as f32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Text(s) => match ty.name() {
                // The external store accepts multiple textual boolean forms.
                "bool" => Value::bool_from_literal(s)
                    .ok_or_else(|| format!("'{s}' is not a boolean literal"))?
                    .to_sql(ty, out),
                _ => s.to_sql(ty, out),
            },
            Value::Date(d) => d.to_sql(ty, out),
            Value::Timestamp(dt) => match ty.name() {
                "timestamptz" => dt.and_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            Value::TimestampTz(dt) => match ty.name() {
                // Same instant, rendered without a zone.
                "timestamp" => dt.naive_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            Value::Decimal(d) => d.to_sql(ty, out),
            Value::Array(items) => encode_array(items, ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        match ty.kind() {
            Kind::Array(element) => scalar_accepted(element),
            _ => scalar_accepted(ty),
        }
    }

    to_sql_checked!();
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

fn encode_integer(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match ty.name() {
        "int2" => i16::try_from(v)
            .map_err(|_| format!("value {v} out of range for int2"))?
            .to_sql(ty, out),
        "int4" => i32::try_from(v)
            .map_err(|_| format!("value {v} out of range for int4"))?
            .to_sql(ty, out),
        "int8" => v.to_sql(ty, out),
        "numeric" => Decimal::from(v).to_sql(ty, out),
        other => Err(format!("cannot bind integer to column type '{other}'").into()),
    }
}

/// Emit the binary array wire format: dimension header derived from the
/// value's nesting, then the elements flattened row-major. The nesting must
/// be rectangular; a NULL is only representable at element positions, not
/// as a whole sub-array.
fn encode_array(items: &[Value], ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let Kind::Array(element) = ty.kind() else {
        return Err(format!("cannot bind an array to column type '{}'", ty.name()).into());
    };

    if items.is_empty() {
        out.put_i32(0);
        out.put_i32(0);
        out.put_u32(element.oid());
        return Ok(IsNull::No);
    }

    let dims = array_dims(items);
    let mut flat = Vec::new();
    flatten(items, dims.len(), &mut flat)?;
    let expected: usize = dims.iter().product();
    if flat.len() != expected {
        return Err("ragged array: sibling lengths differ".into());
    }

    out.put_i32(dims.len() as i32);
    out.put_i32(i32::from(flat.iter().any(|v| v.is_null())));
    out.put_u32(element.oid());
    for len in &dims {
        out.put_i32(*len as i32);
        out.put_i32(1);
    }

    for value in flat {
        if value.is_null() {
            out.put_i32(-1);
            continue;
        }
        let mut chunk = BytesMut::new();
        match value.to_sql(element, &mut chunk)? {
            IsNull::Yes => out.put_i32(-1),
            IsNull::No => {
                out.put_i32(chunk.len() as i32);
                out.extend_from_slice(&chunk);
            }
        }
    }

    Ok(IsNull::No)
}

fn array_dims(items: &[Value]) -> Vec<usize> {
    let mut dims = vec![items.len()];
    let mut level = items;
    while let Some(Value::Array(inner)) = level.first() {
        dims.push(inner.len());
        level = inner;
    }
    dims
}

fn flatten<'a>(
    items: &'a [Value],
    depth: usize,
    flat: &mut Vec<&'a Value>,
) -> Result<(), BoxError> {
    if depth == 1 {
        for value in items {
            if matches!(value, Value::Array(_)) {
                return Err("ragged array: deeper nesting than the first element".into());
            }
            flat.push(value);
        }
        return Ok(());
    }
    for value in items {
        match value {
            Value::Array(inner) => flatten(inner, depth - 1, flat)?,
            Value::Null => return Err("NULL sub-array is not representable".into()),
            _ => return Err("ragged array: shallower nesting than the first element".into()),
        }
    }
    Ok(())
}
