use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgBridgeError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] deadpool::managed::PoolError<tokio_postgres::Error>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid address list '{list}': {reason}")]
    AddressError { list: String, reason: String },

    #[error("Unsupported PostgreSQL type '{type_name}' for column '{column}'")]
    UnsupportedType { column: String, type_name: String },

    #[error("Shard {shard} unavailable: {reason}")]
    ShardUnavailable { shard: usize, reason: String },

    #[error("Conversion error for column '{column}': {reason}")]
    ConversionError { column: String, reason: String },

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl PgBridgeError {
    /// Whether the underlying connection is no longer usable after this error.
    #[must_use]
    pub fn is_broken_connection(&self) -> bool {
        matches!(self, PgBridgeError::PostgresError(e) if e.is_closed())
    }
}
