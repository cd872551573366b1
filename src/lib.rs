//! Async federation layer for reading and writing rows in a
//! PostgreSQL-compatible server from a columnar engine.
//!
//! Three concerns live here: a bidirectional type-conversion layer between
//! the remote relational types and the engine's columnar types (including
//! nested arrays whose declared dimensionality may be wrong or absent), a
//! bounded per-endpoint connection pool, and a host-set resolver that parses
//! the compact `host{a|b}:port,...` grammar and routes reads across shards
//! with replica failover.
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use pg_bridge::{PoolSettings, RemoteTable, TableArgs};
//!
//! # async fn run() -> Result<(), pg_bridge::PgBridgeError> {
//! let table = RemoteTable::attach(
//!     TableArgs {
//!         addresses: "pg{1|2}:5432".to_string(),
//!         database: "postgres".to_string(),
//!         table: "events".to_string(),
//!         user: "reader".to_string(),
//!         password: "secret".to_string(),
//!         schema: None,
//!         on_conflict: None,
//!     },
//!     PoolSettings::default(),
//! )
//! .await?;
//!
//! let mut rows = table.select(None, Some("id % 2 = 0")).await?;
//! while let Some(row) = rows.next().await {
//!     println!("{:?}", row?);
//! }
//! # Ok(())
//! # }
//! ```

mod bridge;
mod decode;
mod encode;
mod error;
mod hostset;
mod introspect;
mod pool;
mod router;
mod schema;
mod table;
mod types;

pub mod prelude;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use bridge::SelectStream;
pub use error::PgBridgeError;
pub use hostset::{DEFAULT_PORT, Endpoint, HostSet, Shard};
pub use introspect::table_structure;
pub use pool::{
    ConnectionSettings, DEFAULT_POOL_CAPACITY, EndpointPools, PoolSettings, PooledConnection,
};
pub use router::Router;
pub use schema::{ColumnDescriptor, DataType, ExternalType};
pub use table::{DEFAULT_SCHEMA, RemoteTable, TableArgs, TableIdentity, TableRows};
pub use types::Value;
