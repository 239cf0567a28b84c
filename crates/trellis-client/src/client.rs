//! Shared triple-store client over a connection pool.

use std::future::Future;

use trellis_core::PoolConfig;

use crate::error::Result;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::transport::Connector;

/// Thread-safe triple-store client with connection pooling.
///
/// This is the single point of access for queries and writes.
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct TripleStoreClient {
    pool: ConnectionPool,
}

impl TripleStoreClient {
    /// Build the pool and open its startup connections.
    pub async fn connect<C: Connector>(config: PoolConfig, connector: C) -> Result<Self> {
        let pool = ConnectionPool::new(config, connector).await?;
        tracing::info!(endpoint = %pool.config().endpoint, "Triple store client ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool for direct connection use.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `op` on one pooled connection. See [`ConnectionPool::with_connection`].
    pub async fn with_connection<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(PooledConnection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.pool.with_connection(op).await
    }

    /// Close the pool. Returns how many connections were closed.
    pub async fn close(&self) -> usize {
        self.pool.close().await
    }
}
