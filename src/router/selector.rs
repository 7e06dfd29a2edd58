//! Healthy-candidate selection for read-write splitting
//!
//! Candidates for a role are the registered datasources with that role whose
//! last recorded probe succeeded. Selection is round-robin with one atomic
//! cursor per role, so concurrent callers spread evenly without locking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Role;
use crate::health::HealthProber;
use crate::registry::{Descriptor, Registry};

use super::RouteError;

/// Round-robin position shared by all callers of one role
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    counter: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }

    /// Advance the cursor and map it onto `len` candidates.
    ///
    /// Returns None if there are no candidates; the cursor is left untouched.
    /// The stored position stays below `len`, so it never overflows.
    pub fn next(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let prev = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some((c % len + 1) % len))
            .unwrap_or_else(|c| c);
        Some(prev % len)
    }
}

/// Picks a healthy datasource for a role
pub struct LoadBalancer {
    registry: Arc<Registry>,
    health: Arc<HealthProber>,
    /// Indexed by `Role::index`
    cursors: [RoundRobinCursor; 2],
}

impl LoadBalancer {
    pub fn new(registry: Arc<Registry>, health: Arc<HealthProber>) -> Self {
        Self {
            registry,
            health,
            cursors: [RoundRobinCursor::new(), RoundRobinCursor::new()],
        }
    }

    /// Healthy datasources for `role`, in registration order
    fn candidates(&self, role: Role) -> Vec<Arc<Descriptor>> {
        let states = self.health.states();
        self.registry
            .snapshot()
            .with_role(role)
            .filter(|d| states.get(d.name()).map(|s| s.is_healthy()).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Select the next healthy datasource for `role`
    pub fn select(&self, role: Role) -> Result<Arc<Descriptor>, RouteError> {
        let candidates = self.candidates(role);
        let idx = self.cursors[role.index()]
            .next(candidates.len())
            .ok_or(RouteError::NoHealthyCandidate(role))?;
        Ok(candidates[idx].clone())
    }

    /// Name of the next healthy datasource for `role`
    pub fn get_data_source(&self, role: Role) -> Result<String, RouteError> {
        self.select(role).map(|d| d.name().to_string())
    }

    /// Names of all healthy datasources for `role`
    pub fn get_available_data_sources(&self, role: Role) -> Vec<String> {
        self.candidates(role)
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }
}
