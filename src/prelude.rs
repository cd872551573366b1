//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::error::PgBridgeError;
pub use crate::hostset::{Endpoint, HostSet, Shard};
pub use crate::pool::{ConnectionSettings, EndpointPools, PoolSettings, PooledConnection};
pub use crate::router::Router;
pub use crate::schema::{ColumnDescriptor, DataType, ExternalType};
pub use crate::table::{RemoteTable, TableArgs, TableIdentity, TableRows};
pub use crate::types::Value;

pub use futures_util::StreamExt;
