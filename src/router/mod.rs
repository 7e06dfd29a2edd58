mod context;
mod interceptor;
mod rw_split;
mod selector;

pub use context::{PinGuard, RoutingContext};
pub use interceptor::{CallPhase, Interceptor, Route, RouteSource};
pub use rw_split::{classify, classify_sql, AccessMode, RwSplitter, Statement};
pub use selector::{LoadBalancer, RoundRobinCursor};

use thiserror::Error;

use crate::config::Role;
use crate::pool::ConnectionError;

/// Routing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Datasource already registered: {0}")]
    DuplicateName(String),

    #[error("Datasource not registered: {0}")]
    NotRegistered(String),

    #[error("No healthy {0} datasource available")]
    NoHealthyCandidate(Role),

    #[error("Not inside a routing scope")]
    NoRoutingScope,

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl RouteError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::DuplicateName(_) => "duplicate_name",
            RouteError::NotRegistered(_) => "not_registered",
            RouteError::NoHealthyCandidate(_) => "no_healthy_candidate",
            RouteError::NoRoutingScope => "no_routing_scope",
            RouteError::Connection(_) => "connection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RouteError::NoHealthyCandidate(Role::Replica).to_string(),
            "No healthy replica datasource available"
        );
        assert_eq!(
            RouteError::NotRegistered("ghost".into()).to_string(),
            "Datasource not registered: ghost"
        );
        let err: RouteError = ConnectionError::Timeout(20).into();
        assert_eq!(err.kind(), "connection");
        assert_eq!(err.to_string(), ConnectionError::Timeout(20).to_string());
    }
}
