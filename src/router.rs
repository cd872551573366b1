use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::PgBridgeError;
use crate::hostset::HostSet;
use crate::pool::{EndpointPools, PooledConnection};

/// Picks one live replica per shard and fails over across the remaining
/// alternatives before giving up.
///
/// Replica choice starts at a round-robin offset and scans forward; an
/// unreachable replica is skipped with a warning, and only when every
/// replica of a shard has refused does the shard surface as unavailable.
pub struct Router {
    hostset: HostSet,
    cursor: AtomicUsize,
}

impl Router {
    #[must_use]
    pub fn new(hostset: HostSet) -> Self {
        Self {
            hostset,
            cursor: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.hostset.shard_count()
    }

    #[must_use]
    pub fn hostset(&self) -> &HostSet {
        &self.hostset
    }

    /// Lease a connection to one live replica of the given shard.
    ///
    /// # Errors
    /// Returns `ShardUnavailable` once every replica of the shard has been
    /// tried; the failure is never silently treated as an empty shard.
    pub async fn connect(
        &self,
        pools: &EndpointPools,
        shard: usize,
    ) -> Result<PooledConnection, PgBridgeError> {
        let replicas = &self
            .hostset
            .shards
            .get(shard)
            .ok_or_else(|| PgBridgeError::ShardUnavailable {
                shard,
                reason: "no such shard".to_string(),
            })?
            .replicas;

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut last_error = String::new();
        for i in 0..replicas.len() {
            let replica = &replicas[(start + i) % replicas.len()];
            match pools.lease(replica).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::warn!("replica {replica} unreachable, trying next: {e}");
                    last_error = format!("{replica}: {e}");
                }
            }
        }

        Err(PgBridgeError::ShardUnavailable {
            shard,
            reason: format!(
                "all {} replicas failed, last error: {last_error}",
                replicas.len()
            ),
        })
    }

    /// Lease one replica connection per shard, in shard order. Any shard
    /// with no reachable replica fails the whole call.
    ///
    /// # Errors
    /// Propagates the first `ShardUnavailable`.
    pub async fn connect_each_shard(
        &self,
        pools: &EndpointPools,
    ) -> Result<Vec<PooledConnection>, PgBridgeError> {
        let mut connections = Vec::with_capacity(self.shard_count());
        for shard in 0..self.shard_count() {
            connections.push(self.connect(pools, shard).await?);
        }
        Ok(connections)
    }
}
