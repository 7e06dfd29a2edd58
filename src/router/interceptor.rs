//! Per-call datasource routing
//!
//! Every persistence call goes through [`Interceptor::execute`]:
//!
//! ```text
//! Unrouted -> Resolving -> Routed -> Executing -> Completed | Failed
//! ```
//!
//! A pinned name from the [`RoutingContext`] is resolved strictly; otherwise
//! the statement is classified and the load balancer picks a healthy
//! datasource of the matching role. Resolution failures end the call before a
//! connection is taken.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::config::{Role, RoutingConfig};
use crate::metrics::metrics;
use crate::pool::{Connection, ConnectionError, ConnectionPool};
use crate::registry::{Descriptor, Registry};

use super::context::RoutingContext;
use super::rw_split::{classify, AccessMode, RwSplitter, Statement};
use super::selector::LoadBalancer;
use super::RouteError;

/// Phase of a routed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Unrouted,
    Resolving,
    Routed,
    Executing,
    Completed,
    Failed,
}

/// Why a datasource was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Explicitly pinned by the caller
    Pinned,
    /// Picked by the load balancer for the statement's role
    Balanced,
    /// Read served by a primary because no replica was healthy
    ReplicaFallback,
    /// Read-write split disabled; configured default datasource
    Default,
}

impl RouteSource {
    pub fn is_pinned(&self) -> bool {
        matches!(self, RouteSource::Pinned)
    }
}

/// Resolution result for one call
#[derive(Debug, Clone)]
pub struct Route {
    pub descriptor: Arc<Descriptor>,
    pub source: RouteSource,
    /// Access mode, when the statement was classified
    pub mode: Option<AccessMode>,
}

impl Route {
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn role(&self) -> Role {
        self.descriptor.role()
    }
}

/// Tracks phase transitions of one call for logging
struct CallTrace<'a> {
    sql: &'a str,
    phase: CallPhase,
}

impl<'a> CallTrace<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            sql,
            phase: CallPhase::Unrouted,
        }
    }

    fn enter(&mut self, next: CallPhase) {
        debug!(from = ?self.phase, to = ?next, sql = %self.sql, "Call phase");
        self.phase = next;
    }
}

/// Returns a checked-out connection to its pool on every exit path.
///
/// The normal path releases inline. If the call future is dropped first
/// (cancellation, panic in the caller's closure) the release is handed to a
/// spawned task.
struct ReleaseGuard {
    pool: Arc<dyn ConnectionPool>,
    conn: Option<Box<dyn Connection>>,
}

impl ReleaseGuard {
    fn new(pool: Arc<dyn ConnectionPool>, conn: Box<dyn Connection>) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn).await;
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let pool = self.pool.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(datasource = %conn.datasource(), "Call abandoned, releasing connection");
                handle.spawn(async move {
                    pool.release(conn).await;
                });
            }
            Err(_) => {
                warn!(datasource = %conn.datasource(), "No runtime to release connection, dropping it");
            }
        }
    }
}

/// Entry point invoked for every persistence call
pub struct Interceptor {
    registry: Arc<Registry>,
    balancer: Arc<LoadBalancer>,
    routing: RoutingConfig,
}

impl Interceptor {
    pub fn new(registry: Arc<Registry>, balancer: Arc<LoadBalancer>, routing: RoutingConfig) -> Self {
        Self {
            registry,
            balancer,
            routing,
        }
    }

    /// Decide which datasource serves `statement`, without acquiring a connection
    pub fn resolve(&self, statement: &Statement) -> Result<Route, RouteError> {
        // Strict mode: a pinned name is used as-is or the call fails
        if let Some(name) = RoutingContext::current() {
            let descriptor = self.registry.resolve(&name)?;
            return Ok(Route {
                descriptor,
                source: RouteSource::Pinned,
                mode: None,
            });
        }

        if !self.routing.read_write_split {
            let descriptor = self.registry.resolve(self.registry.default_name())?;
            return Ok(Route {
                descriptor,
                source: RouteSource::Default,
                mode: None,
            });
        }

        let mode = classify(statement);
        let role = RwSplitter::route(mode, statement.in_transaction);
        match self.balancer.select(role) {
            Ok(descriptor) => Ok(Route {
                descriptor,
                source: RouteSource::Balanced,
                mode: Some(mode),
            }),
            Err(RouteError::NoHealthyCandidate(Role::Replica))
                if self.routing.replica_fallback_to_primary =>
            {
                let descriptor = self.balancer.select(Role::Primary)?;
                warn!(datasource = %descriptor.name(), "No healthy replica, reading from primary");
                Ok(Route {
                    descriptor,
                    source: RouteSource::ReplicaFallback,
                    mode: Some(mode),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Route `statement`, run `f` on a connection from the chosen pool and
    /// release the connection whether `f` succeeds or fails.
    ///
    /// Routing errors are returned before any connection is acquired; pool
    /// errors are passed through as [`RouteError::Connection`].
    pub async fn execute<T, E, F>(&self, statement: &Statement, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, Result<T, E>>,
        E: From<RouteError>,
    {
        let started = Instant::now();
        let mut trace = CallTrace::new(&statement.sql);

        trace.enter(CallPhase::Resolving);
        let route = match self.resolve(statement) {
            Ok(route) => route,
            Err(e) => {
                trace.enter(CallPhase::Failed);
                metrics().record_route_error(e.kind());
                warn!(error = %e, sql = %statement.sql, "Routing failed");
                return Err(e.into());
            }
        };

        trace.enter(CallPhase::Routed);
        metrics().record_route(route.role().as_str(), route.name(), route.source.is_pinned());
        debug!(
            datasource = %route.name(),
            role = %route.role(),
            source = ?route.source,
            "Routed call"
        );

        let pool = route.descriptor.pool().clone();
        let acquired = pool.acquire().await;
        let mut conn = match acquired {
            Ok(conn) => ReleaseGuard::new(pool, conn),
            Err(e) => {
                trace.enter(CallPhase::Failed);
                metrics().record_route_error("connection");
                warn!(datasource = %route.name(), error = %e, "Failed to acquire connection");
                return Err(RouteError::from(e).into());
            }
        };

        trace.enter(CallPhase::Executing);
        let result = match conn.conn.as_deref_mut() {
            Some(c) => f(c).await,
            None => Err(RouteError::from(ConnectionError::Closed(route.name().to_string())).into()),
        };
        conn.release().await;

        let ok = result.is_ok();
        trace.enter(if ok {
            CallPhase::Completed
        } else {
            CallPhase::Failed
        });
        metrics().record_call(route.name(), ok, started.elapsed().as_secs_f64());
        result
    }
}
