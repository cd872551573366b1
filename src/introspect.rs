use tokio_postgres::Client;

use crate::bridge::quote_identifier;
use crate::error::PgBridgeError;
use crate::schema::{ColumnDescriptor, resolve_column};
use crate::table::TableIdentity;

/// Attribute pass over the remote catalog. `format_type` renders at most one
/// `[]` pair and `attndims` can be stale, so array depth is finalized by
/// [`sample_array_dimensions`] when the two disagree.
const ATTRIBUTE_QUERY: &str = "\
SELECT a.attname, \
       format_type(a.atttypid, a.atttypmod) AS data_type, \
       a.attnotnull, \
       a.attndims::int4 AS attndims, \
       pg_get_expr(d.adbin, d.adrelid) AS column_default \
FROM pg_attribute a \
LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
WHERE a.attrelid = $1::text::regclass AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attnum";

/// Resolve the remote table's column descriptors.
///
/// Two-stage resolution: the catalog pass supplies type, nullability,
/// dimension count and default expression; for array columns whose reported
/// dimension is zero (schema-copying statements leave it that way) a stored
/// value is sampled to recover the true nesting depth.
///
/// # Errors
/// Returns `UnsupportedType` for a column outside the conversion matrix,
/// `ExecutionError` when the table does not exist, and driver errors from
/// the catalog queries.
pub async fn table_structure(
    client: &Client,
    identity: &TableIdentity,
) -> Result<Vec<ColumnDescriptor>, PgBridgeError> {
    let regclass = identity.qualified();
    let rows = client.query(ATTRIBUTE_QUERY, &[&regclass]).await?;
    if rows.is_empty() {
        return Err(PgBridgeError::ExecutionError(format!(
            "table {regclass} does not exist or has no columns"
        )));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("attname")?;
        let type_str: String = row.try_get("data_type")?;
        let not_null: bool = row.try_get("attnotnull")?;
        let catalog_dims: i32 = row.try_get("attndims")?;
        let default_expr: Option<String> = row.try_get("column_default")?;

        let dimensions = if type_str.trim_end().ends_with("[]") {
            if catalog_dims > 0 {
                catalog_dims as u32
            } else {
                sample_array_dimensions(client, identity, &name)
                    .await?
                    .unwrap_or(1)
            }
        } else {
            0
        };

        columns.push(resolve_column(
            &name,
            &type_str,
            dimensions,
            !not_null,
            default_expr.as_deref(),
        )?);
    }
    Ok(columns)
}

/// Probe one stored value for its real nesting depth. Returns `None` when
/// the column holds no non-NULL value yet.
async fn sample_array_dimensions(
    client: &Client,
    identity: &TableIdentity,
    column: &str,
) -> Result<Option<u32>, PgBridgeError> {
    let column = quote_identifier(column);
    let sql = format!(
        "SELECT array_ndims({column}) FROM {} WHERE {column} IS NOT NULL LIMIT 1",
        identity.qualified()
    );
    let rows = client.query(&sql, &[]).await?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let dims: Option<i32> = row.try_get(0)?;
    Ok(dims.and_then(|d| u32::try_from(d).ok()))
}
