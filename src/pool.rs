use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::time::Duration;

use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use tokio_postgres::NoTls;

use crate::error::PgBridgeError;
use crate::hostset::Endpoint;

/// Default number of connections kept per endpoint.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// Credentials and database shared by every endpoint of one remote table.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionSettings {
    /// # Errors
    /// Returns `PgBridgeError::ConfigError` if a required field is empty.
    pub fn validate(&self) -> Result<(), PgBridgeError> {
        if self.database.is_empty() {
            return Err(PgBridgeError::ConfigError(
                "database is required".to_string(),
            ));
        }
        if self.user.is_empty() {
            return Err(PgBridgeError::ConfigError("user is required".to_string()));
        }
        Ok(())
    }
}

/// Per-endpoint pool sizing and connection establishment knobs.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Ceiling on simultaneously leased connections per endpoint
    pub capacity: usize,
    /// Applied to each connection attempt; `None` leaves the driver default
    pub connect_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            connect_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Bounded connection pools, one per remote endpoint, created lazily.
///
/// Leasing beyond capacity awaits an idle connection instead of opening a
/// new socket; idle connections are liveness-probed on checkout and dead
/// ones replaced transparently.
pub struct EndpointPools {
    settings: ConnectionSettings,
    pool_settings: PoolSettings,
    pools: Mutex<HashMap<Endpoint, Pool>>,
}

impl EndpointPools {
    /// # Errors
    /// Returns `PgBridgeError::ConfigError` if the connection settings are
    /// incomplete or the capacity is zero.
    pub fn new(
        settings: ConnectionSettings,
        pool_settings: PoolSettings,
    ) -> Result<Self, PgBridgeError> {
        settings.validate()?;
        if pool_settings.capacity == 0 {
            return Err(PgBridgeError::ConfigError(
                "pool capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            settings,
            pool_settings,
            pools: Mutex::new(HashMap::new()),
        })
    }

    /// Lease a connection to `endpoint`, waiting when the endpoint's pool is
    /// at capacity. The returned connection is exclusively owned until drop.
    ///
    /// # Errors
    /// Returns a pool error when the endpoint is unreachable; capacity
    /// saturation is not an error, callers wait.
    pub async fn lease(&self, endpoint: &Endpoint) -> Result<PooledConnection, PgBridgeError> {
        let pool = self.pool_for(endpoint)?;
        let object = pool.get().await?;
        tracing::debug!("leased connection to {endpoint}");
        Ok(PooledConnection {
            object: Some(object),
            endpoint: endpoint.clone(),
            healthy: true,
        })
    }

    fn pool_for(&self, endpoint: &Endpoint) -> Result<Pool, PgBridgeError> {
        let mut pools = match self.pools.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(pool) = pools.get(endpoint) {
            return Ok(pool.clone());
        }

        let mut cfg = PgConfig::new();
        cfg.host = Some(endpoint.host.clone());
        cfg.port = Some(endpoint.port);
        cfg.dbname = Some(self.settings.database.clone());
        cfg.user = Some(self.settings.user.clone());
        cfg.password = Some(self.settings.password.clone());
        cfg.connect_timeout = self.pool_settings.connect_timeout;
        // Verified recycling probes idle connections before reuse.
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Verified,
        });
        cfg.pool = Some(PoolConfig::new(self.pool_settings.capacity));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                PgBridgeError::ConfigError(format!("failed to create pool for {endpoint}: {e}"))
            })?;
        tracing::debug!(
            "new connection pool for {endpoint} (capacity {})",
            self.pool_settings.capacity
        );
        pools.insert(endpoint.clone(), pool.clone());
        Ok(pool)
    }
}

/// A leased physical connection, exclusively owned by one in-flight
/// operation.
///
/// Dropping a healthy connection returns it to the idle set; a connection
/// marked unhealthy is detached and closed instead, and the pool creates a
/// replacement on demand so capacity is not permanently lost.
pub struct PooledConnection {
    // Present from lease until drop.
    object: Option<Object>,
    endpoint: Endpoint,
    healthy: bool,
}

impl PooledConnection {
    /// Flag the underlying connection as corrupted so it is destroyed on
    /// release rather than reused.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Deref for PooledConnection {
    type Target = Object;

    fn deref(&self) -> &Object {
        self.object.as_ref().expect("connection released before drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Object {
        self.object.as_mut().expect("connection released before drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(object) = self.object.take()
            && !self.healthy
        {
            tracing::debug!("discarding unhealthy connection to {}", self.endpoint);
            drop(Object::take(object));
        }
    }
}
