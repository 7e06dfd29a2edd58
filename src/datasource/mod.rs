//! Wiring of registry, health prober, load balancer and interceptor

mod manager;

pub use manager::{DataSourceManager, StartupError};
