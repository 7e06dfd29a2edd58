//! Health checks for registered datasources
//!
//! This module provides:
//! - Per-datasource state machine (unknown -> healthy <-> unhealthy)
//! - A synchronous probe round for startup and tests
//! - A periodic background prober
//! - Read-only health snapshots for routing and diagnostics

mod prober;
mod state;

pub use prober::{HealthProber, HealthStats};
pub use state::{HealthState, HealthStatus};
