//! In-process pool used by tests and local runs
//!
//! Behaves like a bounded driver pool: checkouts are limited by a semaphore,
//! `acquire` waits up to the configured timeout, and reachability can be
//! toggled to simulate an outage. Every executed statement is logged so
//! callers can see where their calls landed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::config::{DataSourceConfig, PoolSizing};

use super::connection::{Connection, ConnectionError, ConnectionPool, PoolBuilder};

struct Shared {
    name: String,
    reachable: AtomicBool,
    closed: AtomicBool,
    executed: Mutex<Vec<String>>,
}

/// Bounded in-memory connection pool
pub struct MemoryPool {
    shared: Arc<Shared>,
    sizing: PoolSizing,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    acquired_total: AtomicU64,
    released_total: AtomicU64,
    pings_total: AtomicU64,
}

impl MemoryPool {
    pub fn new(name: impl Into<String>, sizing: PoolSizing) -> Self {
        let permits = Arc::new(Semaphore::new(sizing.max_size));
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                reachable: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                executed: Mutex::new(Vec::new()),
            }),
            sizing,
            permits,
            next_id: AtomicU64::new(1),
            acquired_total: AtomicU64::new(0),
            released_total: AtomicU64::new(0),
            pings_total: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Simulate the backend going away or coming back
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.shared.reachable.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Statements executed through this pool, oldest first
    pub fn executed(&self) -> Vec<String> {
        self.shared.executed.lock().clone()
    }

    /// Connections currently checked out
    pub fn in_use(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.sizing.max_size - self.permits.available_permits()
    }

    pub fn acquired_total(&self) -> u64 {
        self.acquired_total.load(Ordering::Relaxed)
    }

    pub fn released_total(&self) -> u64 {
        self.released_total.load(Ordering::Relaxed)
    }

    pub fn pings_total(&self) -> u64 {
        self.pings_total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.shared.name.clone()));
        }
        if !self.is_reachable() {
            return Err(ConnectionError::Connect(format!(
                "{} is unreachable",
                self.shared.name
            )));
        }

        let wait = Duration::from_millis(self.sizing.acquire_timeout_ms);
        let permit = match tokio::time::timeout(wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ConnectionError::Closed(self.shared.name.clone())),
            Err(_) => return Err(ConnectionError::Timeout(self.sizing.acquire_timeout_ms)),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.acquired_total.fetch_add(1, Ordering::Relaxed);
        debug!(datasource = %self.shared.name, conn_id = id, "Connection acquired");

        Ok(Box::new(MemoryConnection {
            id,
            shared: self.shared.clone(),
            _permit: permit,
        }))
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        self.released_total.fetch_add(1, Ordering::Relaxed);
        debug!(datasource = %conn.datasource(), "Connection released");
        // Dropping the connection returns its permit
        drop(conn);
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        self.pings_total.fetch_add(1, Ordering::Relaxed);
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.shared.name.clone()));
        }
        if !self.is_reachable() {
            return Err(ConnectionError::Connect(format!(
                "{} is unreachable",
                self.shared.name
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        debug!(datasource = %self.shared.name, "Pool closed");
    }
}

/// Connection handed out by [`MemoryPool`]
pub struct MemoryConnection {
    id: u64,
    shared: Arc<Shared>,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn datasource(&self) -> &str {
        &self.shared.name
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, ConnectionError> {
        if !self.shared.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::Database(format!(
                "connection {} to {} lost",
                self.id, self.shared.name
            )));
        }
        self.shared.executed.lock().push(sql.to_string());
        Ok(1)
    }
}

/// URL scheme served by [`MemoryPoolBuilder`]
pub const MEMORY_SCHEME: &str = "mem://";

/// Builds a [`MemoryPool`] per datasource and keeps a handle to each.
///
/// Only `mem://` URLs are accepted; a driver URL such as `mysql://` is
/// rejected instead of being answered by the simulator.
#[derive(Default)]
pub struct MemoryPoolBuilder {
    pools: Mutex<HashMap<String, Arc<MemoryPool>>>,
}

impl MemoryPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool built for `name`, if any
    pub fn pool(&self, name: &str) -> Option<Arc<MemoryPool>> {
        self.pools.lock().get(name).cloned()
    }
}

impl PoolBuilder for MemoryPoolBuilder {
    fn build(&self, config: &DataSourceConfig) -> Result<Arc<dyn ConnectionPool>, ConnectionError> {
        if !config.url.starts_with(MEMORY_SCHEME) {
            return Err(ConnectionError::Connect(format!(
                "unsupported url '{}' for datasource {}: only {} datasources can be built in-process",
                config.url, config.name, MEMORY_SCHEME
            )));
        }
        let pool = Arc::new(MemoryPool::new(config.name.clone(), config.pool.clone()));
        self.pools.lock().insert(config.name.clone(), pool.clone());
        Ok(pool)
    }
}
