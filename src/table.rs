use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};

use crate::bridge::{self, SelectStream, quote_identifier};
use crate::error::PgBridgeError;
use crate::hostset::HostSet;
use crate::introspect;
use crate::pool::{ConnectionSettings, EndpointPools, PoolSettings};
use crate::router::Router;
use crate::schema::ColumnDescriptor;
use crate::types::Value;

/// Schema used when the caller leaves the schema argument empty.
pub const DEFAULT_SCHEMA: &str = "public";

/// The table-function / table-engine argument surface:
/// `endpoint-or-hostset, database, table, user, password, [schema],
/// [conflict-clause]`.
///
/// ```rust
/// use pg_bridge::TableArgs;
///
/// let args = TableArgs {
///     addresses: "pg{1|2}:5432".to_string(),
///     database: "postgres".to_string(),
///     table: "events".to_string(),
///     user: "reader".to_string(),
///     password: "secret".to_string(),
///     schema: None,
///     on_conflict: Some("ON CONFLICT DO NOTHING".to_string()),
/// };
/// # let _ = args;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableArgs {
    /// Single `host:port` or the brace/comma host-set grammar
    pub addresses: String,
    pub database: String,
    pub table: String,
    pub user: String,
    pub password: String,
    /// Remote schema; empty or absent means [`DEFAULT_SCHEMA`]
    #[serde(default)]
    pub schema: Option<String>,
    /// Appended verbatim to generated INSERT statements
    #[serde(default)]
    pub on_conflict: Option<String>,
}

impl TableArgs {
    /// # Errors
    /// Returns `PgBridgeError::ConfigError` if a required argument is empty.
    pub fn validate(&self) -> Result<(), PgBridgeError> {
        if self.addresses.trim().is_empty() {
            return Err(PgBridgeError::ConfigError(
                "addresses are required".to_string(),
            ));
        }
        if self.table.is_empty() {
            return Err(PgBridgeError::ConfigError("table is required".to_string()));
        }
        ConnectionSettings {
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        }
        .validate()
    }

    fn identity(&self) -> TableIdentity {
        let schema = match self.schema.as_deref() {
            None | Some("") => DEFAULT_SCHEMA.to_string(),
            Some(schema) => schema.to_string(),
        };
        TableIdentity {
            database: self.database.clone(),
            schema,
            table: self.table.clone(),
            on_conflict: self.on_conflict.clone(),
        }
    }
}

/// Resolved identity of the remote table. Immutable after parsing; schema
/// and table names are opaque and may themselves contain dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdentity {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub on_conflict: Option<String>,
}

impl TableIdentity {
    /// Quoted `"schema"."table"` form for statement generation.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }
}

/// An attached remote table: parsed topology, per-endpoint pools, and the
/// resolved column descriptors.
///
/// Attachment resolves everything that can fail before rows flow (address
/// grammar, connectivity, schema introspection including the array-depth
/// sampling fallback), so a constructed `RemoteTable` is ready to stream.
pub struct RemoteTable {
    identity: TableIdentity,
    router: Router,
    pools: EndpointPools,
    columns: Arc<Vec<ColumnDescriptor>>,
}

impl RemoteTable {
    /// Parse the arguments, connect, and resolve the remote schema.
    ///
    /// # Errors
    /// Surfaces resolution errors (grammar, unsupported column type, missing
    /// table) and connectivity errors before any row flows.
    pub async fn attach(
        args: TableArgs,
        pool_settings: PoolSettings,
    ) -> Result<Self, PgBridgeError> {
        args.validate()?;
        let hostset = HostSet::parse(&args.addresses)?;
        let identity = args.identity();
        let pools = EndpointPools::new(
            ConnectionSettings {
                user: args.user,
                password: args.password,
                database: args.database.clone(),
            },
            pool_settings,
        )?;
        let router = Router::new(hostset);

        // Shards are replicas of one logical schema; the first reachable
        // shard answers for all of them.
        let connection = router.connect(&pools, 0).await?;
        let columns = introspect::table_structure(&connection, &identity).await?;
        drop(connection);

        Ok(Self {
            identity,
            router,
            pools,
            columns: Arc::new(columns),
        })
    }

    #[must_use]
    pub fn identity(&self) -> &TableIdentity {
        &self.identity
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Schema description: (name, internal type string) per column, arrays
    /// rendered as nested `Array(...)` and nullable leaves as
    /// `Nullable(...)`.
    #[must_use]
    pub fn describe(&self) -> Vec<(String, String)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type.to_string()))
            .collect()
    }

    /// Stream rows from every shard: exactly one replica answers per shard
    /// and the per-shard streams are concatenated, so the union covers the
    /// logical dataset without cross-shard duplication.
    ///
    /// # Errors
    /// Fails if any shard has no reachable replica (`ShardUnavailable`) or
    /// if a projected column does not exist.
    pub async fn select(
        &self,
        projection: Option<&[&str]>,
        predicate: Option<&str>,
    ) -> Result<TableRows, PgBridgeError> {
        let columns = match projection {
            None => self.columns.clone(),
            Some(names) => {
                let mut projected = Vec::with_capacity(names.len());
                for name in names {
                    let column = self
                        .columns
                        .iter()
                        .find(|c| c.name == *name)
                        .cloned()
                        .ok_or_else(|| PgBridgeError::UnknownColumn((*name).to_string()))?;
                    projected.push(column);
                }
                Arc::new(projected)
            }
        };

        let mut shards = VecDeque::with_capacity(self.router.shard_count());
        for connection in self.router.connect_each_shard(&self.pools).await? {
            let stream =
                bridge::select_stream(connection, &self.identity, columns.clone(), predicate)
                    .await?;
            shards.push_back(stream);
        }
        Ok(TableRows { shards })
    }

    /// Insert a batch of rows, one value per resolved column, acknowledging
    /// the count the remote store reports. With a conflict clause attached,
    /// re-inserting present keys acknowledges zero instead of failing.
    ///
    /// # Errors
    /// Per-row conversion failures and remote statement errors abort the
    /// batch; the transaction rolls back.
    pub async fn insert(&self, rows: &[Vec<Value>]) -> Result<u64, PgBridgeError> {
        // Writes are not fanned out: replicas within the shard are read
        // alternatives, and multi-shard placement belongs to the engine.
        let mut connection = self.router.connect(&self.pools, 0).await?;
        match bridge::insert_rows(&mut connection, &self.identity, &self.columns, rows).await {
            Ok(count) => Ok(count),
            Err(e) => {
                if e.is_broken_connection() {
                    connection.mark_unhealthy();
                }
                Err(e)
            }
        }
    }
}

/// Concatenated per-shard row streams of one logical read.
pub struct TableRows {
    shards: VecDeque<SelectStream>,
}

impl Stream for TableRows {
    type Item = Result<Vec<Value>, PgBridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(front) = this.shards.front_mut() else {
                return Poll::Ready(None);
            };
            match Pin::new(front).poll_next(cx) {
                Poll::Ready(None) => {
                    this.shards.pop_front();
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TableArgs {
        TableArgs {
            addresses: "pg1:5432".to_string(),
            database: "postgres".to_string(),
            table: "t".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
            schema: None,
            on_conflict: None,
        }
    }

    #[test]
    fn empty_schema_defaults_to_public() {
        let identity = args().identity();
        assert_eq!(identity.schema, DEFAULT_SCHEMA);
        assert_eq!(identity.qualified(), "\"public\".\"t\"");

        let mut with_empty = args();
        with_empty.schema = Some(String::new());
        assert_eq!(with_empty.identity().schema, DEFAULT_SCHEMA);
    }

    #[test]
    fn dotted_names_stay_opaque() {
        let mut dotted = args();
        dotted.schema = Some("test.nice.schema".to_string());
        dotted.table = "test.nice.table".to_string();
        assert_eq!(
            dotted.identity().qualified(),
            "\"test.nice.schema\".\"test.nice.table\""
        );
    }

    #[test]
    fn validation_requires_core_arguments() {
        for strip in ["addresses", "database", "table", "user"] {
            let mut bad = args();
            match strip {
                "addresses" => bad.addresses.clear(),
                "database" => bad.database.clear(),
                "table" => bad.table.clear(),
                _ => bad.user.clear(),
            }
            assert!(
                matches!(bad.validate(), Err(PgBridgeError::ConfigError(_))),
                "{strip}"
            );
        }
        assert!(args().validate().is_ok());
    }
}
