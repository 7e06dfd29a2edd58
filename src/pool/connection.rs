use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DataSourceConfig;

/// A checked-out connection handed to the routed call
#[async_trait]
pub trait Connection: Send {
    /// Name of the datasource this connection belongs to
    fn datasource(&self) -> &str;

    /// Run a raw statement on the backend, returning affected/returned rows
    async fn execute(&mut self, sql: &str) -> Result<u64, ConnectionError>;
}

/// A physical connection pool owned by the driver layer.
///
/// The router only decides which pool to use and when to probe it;
/// connection lifecycle stays with the implementation.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Check out a connection, waiting up to the pool's acquire timeout
    async fn acquire(&self) -> Result<Box<dyn Connection>, ConnectionError>;

    /// Give a connection back.
    ///
    /// Called exactly once for every connection handed out by `acquire`,
    /// also when the routed call is cancelled; in that case it runs on a
    /// spawned task.
    async fn release(&self, conn: Box<dyn Connection>);

    /// Minimal liveness round-trip
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// Stop handing out connections and drop idle ones
    async fn close(&self) {}
}

/// Builds a pool for a configured datasource
pub trait PoolBuilder: Send + Sync {
    fn build(&self, config: &DataSourceConfig) -> Result<Arc<dyn ConnectionPool>, ConnectionError>;
}

/// Connection errors, propagated unchanged through the router
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Timed out after {0}ms waiting for a connection")]
    Timeout(u64),

    #[error("Pool exhausted: {0}")]
    Exhausted(String),

    #[error("Pool closed: {0}")]
    Closed(String),

    #[error("Database error: {0}")]
    Database(String),
}
