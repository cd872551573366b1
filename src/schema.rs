use std::fmt;

use crate::error::PgBridgeError;

/// Precision/scale used for an unconstrained `numeric` column, capped at
/// what the backing 96-bit decimal mantissa can round-trip.
pub const DEFAULT_NUMERIC_PRECISION: u32 = 28;
pub const DEFAULT_NUMERIC_SCALE: u32 = 9;

/// External scalar type as reported by the remote catalog.
///
/// One variant per supported external primitive; the conversion layer is a
/// total match over this set, so an unsupported catalog type fails at
/// attach time rather than at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Serial,
    BigSerial,
    Timestamp,
    TimestampTz,
    Date,
    Numeric { precision: u32, scale: u32 },
    Boolean,
    Text,
}

impl ExternalType {
    /// Parse the catalog's rendered type (`format_type` output).
    ///
    /// Returns the scalar type and whether the declaration carried array
    /// syntax. The catalog renders at most one `[]` pair regardless of the
    /// declared dimension count; the true depth comes from `attndims` or the
    /// sampling fallback.
    ///
    /// # Errors
    /// Returns the unparsed type string when it is not in the supported set.
    pub fn parse(type_str: &str) -> Result<(ExternalType, bool), String> {
        let mut base = type_str.trim();
        let mut is_array = false;
        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped.trim_end();
            is_array = true;
        }

        let external = match base {
            "smallint" | "int2" => ExternalType::SmallInt,
            "integer" | "int" | "int4" => ExternalType::Integer,
            "bigint" | "int8" => ExternalType::BigInt,
            "real" | "float4" => ExternalType::Real,
            "double precision" | "float8" => ExternalType::DoublePrecision,
            "date" => ExternalType::Date,
            "boolean" | "bool" => ExternalType::Boolean,
            "text" | "name" => ExternalType::Text,
            "timestamptz" => ExternalType::TimestampTz,
            _ if base.starts_with("timestamp") => {
                if base.contains("with time zone") && !base.contains("without time zone") {
                    ExternalType::TimestampTz
                } else {
                    ExternalType::Timestamp
                }
            }
            _ if base.starts_with("numeric") || base.starts_with("decimal") => {
                parse_numeric(base)?
            }
            _ if base.starts_with("character") || base.starts_with("char") || base.starts_with("varchar") => {
                ExternalType::Text
            }
            _ => return Err(type_str.to_string()),
        };

        Ok((external, is_array))
    }

    /// Promote a catalog integer to its auto-incrementing form. Applied when
    /// the column default is a `nextval(...)` sequence expression, which is
    /// the only trace `serial`/`bigserial` leave in the catalog.
    #[must_use]
    pub fn promote_serial(self) -> ExternalType {
        match self {
            ExternalType::Integer | ExternalType::SmallInt => ExternalType::Serial,
            ExternalType::BigInt => ExternalType::BigSerial,
            other => other,
        }
    }
}

fn parse_numeric(base: &str) -> Result<ExternalType, String> {
    let Some(open) = base.find('(') else {
        return Ok(ExternalType::Numeric {
            precision: DEFAULT_NUMERIC_PRECISION,
            scale: DEFAULT_NUMERIC_SCALE,
        });
    };
    let Some(close) = base.rfind(')') else {
        return Err(base.to_string());
    };
    let args = &base[open + 1..close];
    let (p, s) = match args.split_once(',') {
        Some((p, s)) => (p.trim(), s.trim()),
        None => (args.trim(), "0"),
    };
    let precision: u32 = p.parse().map_err(|_| base.to_string())?;
    let scale: u32 = s.parse().map_err(|_| base.to_string())?;
    Ok(ExternalType::Numeric { precision, scale })
}

/// Internal columnar type, rendered for schema descriptions as nested
/// `Array(...)` wrappers with `Nullable(...)` at the leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Int16,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Date,
    DateTime,
    DateTimeTz,
    Decimal(u32, u32),
    Bool,
    Nullable(Box<DataType>),
    Array(Box<DataType>),
}

impl DataType {
    /// Map an external scalar to its internal scalar counterpart.
    #[must_use]
    pub fn scalar_of(external: ExternalType) -> DataType {
        match external {
            ExternalType::SmallInt => DataType::Int16,
            ExternalType::Integer => DataType::Int32,
            ExternalType::BigInt => DataType::Int64,
            ExternalType::Real => DataType::Float32,
            ExternalType::DoublePrecision => DataType::Float64,
            ExternalType::Serial => DataType::UInt32,
            ExternalType::BigSerial => DataType::UInt64,
            ExternalType::Timestamp => DataType::DateTime,
            ExternalType::TimestampTz => DataType::DateTimeTz,
            ExternalType::Date => DataType::Date,
            ExternalType::Numeric { precision, scale } => DataType::Decimal(precision, scale),
            ExternalType::Boolean => DataType::Bool,
            ExternalType::Text => DataType::String,
        }
    }

    /// Build the full wrapped type: `Nullable` at the leaf when the catalog
    /// does not guarantee NOT NULL, then one `Array` wrapper per dimension.
    #[must_use]
    pub fn of(external: ExternalType, dimensions: u32, nullable: bool) -> DataType {
        let mut data_type = DataType::scalar_of(external);
        if nullable {
            data_type = DataType::Nullable(Box::new(data_type));
        }
        for _ in 0..dimensions {
            data_type = DataType::Array(Box::new(data_type));
        }
        data_type
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int16 => write!(f, "Int16"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::UInt32 => write!(f, "UInt32"),
            DataType::UInt64 => write!(f, "UInt64"),
            DataType::Float32 => write!(f, "Float32"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::String => write!(f, "String"),
            DataType::Date => write!(f, "Date"),
            DataType::DateTime => write!(f, "DateTime"),
            DataType::DateTimeTz => write!(f, "DateTimeTz"),
            DataType::Decimal(p, s) => write!(f, "Decimal({p}, {s})"),
            DataType::Bool => write!(f, "Bool"),
            DataType::Nullable(inner) => write!(f, "Nullable({inner})"),
            DataType::Array(inner) => write!(f, "Array({inner})"),
        }
    }
}

/// Resolved description of one remote column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name, opaque once fetched
    pub name: String,
    /// External scalar type (array element type for array columns)
    pub external: ExternalType,
    /// Array nesting depth; 0 for scalar columns
    pub dimensions: u32,
    /// Whether the catalog allows NULL for this column
    pub nullable: bool,
    /// Fully wrapped internal type
    pub data_type: DataType,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(name: String, external: ExternalType, dimensions: u32, nullable: bool) -> Self {
        let data_type = DataType::of(external, dimensions, nullable);
        Self {
            name,
            external,
            dimensions,
            nullable,
            data_type,
        }
    }
}

/// Map a raw catalog row (type string, dimension count, nullability, default
/// expression) to a descriptor, without the sampling fallback.
///
/// # Errors
/// Returns `UnsupportedType` for a type outside the conversion matrix.
pub fn resolve_column(
    name: &str,
    type_str: &str,
    dimensions: u32,
    nullable: bool,
    default_expr: Option<&str>,
) -> Result<ColumnDescriptor, PgBridgeError> {
    let (mut external, _) =
        ExternalType::parse(type_str).map_err(|type_name| PgBridgeError::UnsupportedType {
            column: name.to_string(),
            type_name,
        })?;
    if default_expr.is_some_and(|d| d.starts_with("nextval(")) {
        external = external.promote_serial();
    }
    Ok(ColumnDescriptor::new(
        name.to_string(),
        external,
        dimensions,
        nullable,
    ))
}
