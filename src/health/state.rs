//! Health state for a single datasource
//!
//! Tracks the consecutive-failure streak. A success always makes the
//! datasource healthy; failures flip it to unhealthy once the streak reaches
//! the threshold. Until the threshold is reached a healthy datasource stays
//! healthy and an unprobed one stays unknown.

use std::time::{Duration, Instant};

/// Health status of a datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Not probed yet, or failing but still below threshold
    #[default]
    Unknown,
    /// Last probe succeeded
    Healthy,
    /// Failure streak reached threshold
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Health state of one datasource
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Current status
    pub status: HealthStatus,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Last probe timestamp
    pub last_checked_at: Option<Instant>,
    /// Last successful probe timestamp
    pub last_success_at: Option<Instant>,
    /// Error from the most recent failed probe
    pub last_error: Option<String>,
    failure_threshold: u32,
}

impl HealthState {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            last_checked_at: None,
            last_success_at: None,
            last_error: None,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Record a successful probe. Returns true if status changed.
    pub fn record_success(&mut self) -> bool {
        let now = Instant::now();
        self.last_checked_at = Some(now);
        self.last_success_at = Some(now);
        self.consecutive_failures = 0;
        self.last_error = None;
        self.transition(HealthStatus::Healthy)
    }

    /// Record a failed probe. Returns true if status changed.
    pub fn record_failure(&mut self, error: impl Into<String>) -> bool {
        self.last_checked_at = Some(Instant::now());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());

        if self.consecutive_failures >= self.failure_threshold {
            self.transition(HealthStatus::Unhealthy)
        } else {
            false
        }
    }

    fn transition(&mut self, next: HealthStatus) -> bool {
        let changed = self.status != next;
        self.status = next;
        changed
    }

    pub fn time_since_last_check(&self) -> Option<Duration> {
        self.last_checked_at.map(|t| t.elapsed())
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }
}
