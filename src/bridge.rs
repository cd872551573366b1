use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use tokio_postgres::RowStream;
use tokio_postgres::types::ToSql;

use crate::decode::decode_row;
use crate::error::PgBridgeError;
use crate::pool::PooledConnection;
use crate::schema::ColumnDescriptor;
use crate::table::TableIdentity;
use crate::types::Value;

/// Double-quote an identifier, doubling embedded quotes. Names containing
/// dots stay opaque; they are never re-split.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn select_sql(
    identity: &TableIdentity,
    columns: &[ColumnDescriptor],
    predicate: Option<&str>,
) -> String {
    let projection = columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("SELECT {projection} FROM {}", identity.qualified());
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    sql
}

pub(crate) fn insert_sql(identity: &TableIdentity, columns: &[ColumnDescriptor]) -> String {
    let names = columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({names}) VALUES ({placeholders})",
        identity.qualified()
    );
    if let Some(clause) = &identity.on_conflict {
        sql.push(' ');
        sql.push_str(clause);
    }
    sql
}

// From the tokio-postgres docs: adapt a parameter slice for query_raw.
fn slice_iter<'a>(
    s: &'a [&'a (dyn ToSql + Sync)],
) -> impl ExactSizeIterator<Item = &'a dyn ToSql> + 'a {
    s.iter().map(|s| *s as _)
}

/// Rows of one shard-scan: lazy, forward-only, non-restartable.
///
/// The leased connection rides along and is returned to its pool when the
/// stream is exhausted or dropped; dropping mid-stream marks the connection
/// unhealthy so a half-consumed protocol state is never reused.
pub struct SelectStream {
    connection: PooledConnection,
    inner: Pin<Box<RowStream>>,
    columns: Arc<Vec<ColumnDescriptor>>,
    done: bool,
}

impl Stream for SelectStream {
    type Item = Result<Vec<Value>, PgBridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(row))) => match decode_row(&row, &this.columns) {
                Ok(values) => Poll::Ready(Some(Ok(values))),
                Err(e) => {
                    this.done = true;
                    this.connection.mark_unhealthy();
                    Poll::Ready(Some(Err(e)))
                }
            },
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                this.connection.mark_unhealthy();
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SelectStream {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(
                "select on {} aborted mid-stream, discarding connection",
                self.connection.endpoint()
            );
            self.connection.mark_unhealthy();
        }
    }
}

/// Execute a projected, optionally filtered SELECT and stream the rows back
/// without materializing the result set.
///
/// # Errors
/// Returns driver errors from preparation or execution; per-row conversion
/// failures surface through the stream.
pub async fn select_stream(
    connection: PooledConnection,
    identity: &TableIdentity,
    columns: Arc<Vec<ColumnDescriptor>>,
    predicate: Option<&str>,
) -> Result<SelectStream, PgBridgeError> {
    let sql = select_sql(identity, &columns, predicate);
    tracing::debug!("executing remote select: {sql}");
    let statement = connection.prepare(&sql).await?;
    let inner = connection.query_raw(&statement, slice_iter(&[])).await?;
    Ok(SelectStream {
        connection,
        inner: Box::pin(inner),
        columns,
        done: false,
    })
}

/// Insert a batch of internal rows inside one transaction, translating each
/// value back to the remote representation. The identity's conflict clause,
/// when configured, is appended verbatim so re-inserting existing primary
/// keys is a no-op rather than an error.
///
/// Returns the number of rows the remote store actually inserted.
///
/// # Errors
/// Returns `ExecutionError` on arity mismatch and driver errors otherwise;
/// any failure rolls the transaction back.
pub async fn insert_rows(
    connection: &mut PooledConnection,
    identity: &TableIdentity,
    columns: &[ColumnDescriptor],
    rows: &[Vec<Value>],
) -> Result<u64, PgBridgeError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let sql = insert_sql(identity, columns);
    tracing::debug!("executing remote insert: {sql}");

    let transaction = connection.transaction().await?;
    let statement = transaction.prepare(&sql).await?;
    let mut inserted = 0u64;
    for row in rows {
        if row.len() != columns.len() {
            return Err(PgBridgeError::ExecutionError(format!(
                "row has {} values, table has {} columns",
                row.len(),
                columns.len()
            )));
        }
        let params: Vec<&(dyn ToSql + Sync)> =
            row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        inserted += transaction.execute(&statement, &params).await?;
    }
    transaction.commit().await?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, ExternalType};

    fn identity(on_conflict: Option<&str>) -> TableIdentity {
        TableIdentity {
            database: "postgres".to_string(),
            schema: "public".to_string(),
            table: "test_table".to_string(),
            on_conflict: on_conflict.map(str::to_string),
        }
    }

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("a".to_string(), ExternalType::Integer, 0, false),
            ColumnDescriptor::new("b".to_string(), ExternalType::Text, 0, true),
        ]
    }

    #[test]
    fn quotes_identifiers_opaquely() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("test.nice.table"), "\"test.nice.table\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn builds_projected_select() {
        let sql = select_sql(&identity(None), &columns(), None);
        assert_eq!(sql, "SELECT \"a\", \"b\" FROM \"public\".\"test_table\"");

        let sql = select_sql(&identity(None), &columns(), Some("a % 2 = 0"));
        assert_eq!(
            sql,
            "SELECT \"a\", \"b\" FROM \"public\".\"test_table\" WHERE a % 2 = 0"
        );
    }

    #[test]
    fn builds_insert_with_conflict_clause() {
        let sql = insert_sql(&identity(None), &columns());
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"test_table\" (\"a\", \"b\") VALUES ($1, $2)"
        );

        let sql = insert_sql(&identity(Some("ON CONFLICT DO NOTHING")), &columns());
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"test_table\" (\"a\", \"b\") VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
    }
}
