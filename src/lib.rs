//! Role-aware datasource routing
//!
//! Calls are routed to a primary or replica datasource. The choice comes from
//! an explicit task-local pin or from statement classification, and replicas
//! are load balanced over the ones whose last health probe succeeded.

pub mod config;
pub mod datasource;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod router;

pub use config::{Config, DataSourceConfig, Role};
pub use datasource::{DataSourceManager, StartupError};
pub use health::{HealthProber, HealthStatus};
pub use registry::{Descriptor, Registry};
pub use router::{Interceptor, LoadBalancer, RouteError, RoutingContext, Statement};
