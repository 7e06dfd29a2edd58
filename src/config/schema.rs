use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Routing behaviour
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Physical datasources, in registration order
    #[serde(default)]
    pub datasources: Vec<DataSourceConfig>,
    /// Health check configuration
    #[serde(default)]
    pub health: HealthCheckConfig,
}

impl Config {
    /// Validate the configuration before anything is built from it
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datasources.is_empty() {
            return Err(ConfigError::Validation(
                "at least one datasource must be configured".into(),
            ));
        }

        let mut seen = HashSet::new();
        for ds in &self.datasources {
            if ds.name.trim().is_empty() {
                return Err(ConfigError::Validation("datasource name is empty".into()));
            }
            if !seen.insert(ds.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate datasource name: {}",
                    ds.name
                )));
            }
            ds.pool.validate(&ds.name)?;
        }

        if !self.datasources.iter().any(|ds| ds.role == Role::Primary) {
            return Err(ConfigError::Validation(
                "at least one primary datasource is required".into(),
            ));
        }

        let default = self
            .datasources
            .iter()
            .find(|ds| ds.name == self.routing.default_datasource)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "default datasource '{}' is not configured",
                    self.routing.default_datasource
                ))
            })?;
        if default.role != Role::Primary {
            return Err(ConfigError::Validation(format!(
                "default datasource '{}' must be a primary",
                default.name
            )));
        }

        if self.health.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "health.failure_threshold must be at least 1".into(),
            ));
        }
        if self.health.check_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "health.check_interval_ms must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Look up a datasource config by name
    pub fn datasource(&self, name: &str) -> Option<&DataSourceConfig> {
        self.datasources.iter().find(|ds| ds.name == name)
    }
}

// ============================================================================
// Routing Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Datasource used when no other routing signal applies
    #[serde(default = "default_datasource_name")]
    pub default_datasource: String,
    /// Route reads to replicas and writes to primaries.
    /// When disabled every unpinned call goes to `default_datasource`.
    #[serde(default = "default_read_write_split")]
    pub read_write_split: bool,
    /// Let reads use a primary when no replica is healthy
    #[serde(default)]
    pub replica_fallback_to_primary: bool,
}

fn default_datasource_name() -> String {
    "master".to_string()
}

fn default_read_write_split() -> bool {
    true
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_datasource: default_datasource_name(),
            read_write_split: default_read_write_split(),
            replica_fallback_to_primary: false,
        }
    }
}

// ============================================================================
// Health Check Configuration
// ============================================================================

/// Health check configuration for datasources
#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    /// Whether the background prober runs
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    /// Interval between background rounds (milliseconds)
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Consecutive failures before a datasource is marked unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Timeout for each probe (milliseconds)
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

fn default_health_enabled() -> bool {
    true
}

fn default_check_interval_ms() -> u64 {
    5000
}

fn default_failure_threshold() -> u32 {
    1
}

fn default_check_timeout_ms() -> u64 {
    3000
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            check_interval_ms: default_check_interval_ms(),
            failure_threshold: default_failure_threshold(),
            check_timeout_ms: default_check_timeout_ms(),
        }
    }
}

// ============================================================================
// Datasource Configuration
// ============================================================================

/// One physical connection pool
#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    /// Unique name used for pinning and diagnostics
    pub name: String,
    /// Replication role
    #[serde(default)]
    pub role: Role,
    /// Driver URL, e.g. `mysql://db-1:3306/app`
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Pool sizing
    #[serde(default)]
    pub pool: PoolSizing,
}

impl DataSourceConfig {
    pub fn new(name: impl Into<String>, role: Role, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            url: url.into(),
            username: String::new(),
            password: String::new(),
            pool: PoolSizing::default(),
        }
    }

    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }

    pub fn is_replica(&self) -> bool {
        self.role == Role::Replica
    }
}

/// Replication role of a datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Accepts reads and writes
    #[default]
    #[serde(alias = "master")]
    Primary,
    /// Read-only follower
    #[serde(alias = "slave")]
    Replica,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Primary, Role::Replica];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Role::Primary => 0,
            Role::Replica => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool sizing bounds handed to the pool builder
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSizing {
    /// Connections kept open while idle
    #[serde(default = "default_min_idle")]
    pub min_idle: usize,
    /// Maximum concurrently checked-out connections
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// How long `acquire` waits for a free connection (milliseconds)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_min_idle() -> usize {
    1
}

fn default_max_size() -> usize {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            min_idle: default_min_idle(),
            max_size: default_max_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl PoolSizing {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Validation(format!(
                "datasource '{}': pool.max_size must be at least 1",
                name
            )));
        }
        if self.min_idle > self.max_size {
            return Err(ConfigError::Validation(format!(
                "datasource '{}': pool.min_idle ({}) exceeds pool.max_size ({})",
                name, self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            datasources: vec![DataSourceConfig::new(
                "master",
                Role::Primary,
                "mem://master",
            )],
            health: HealthCheckConfig::default(),
        }
    }
}
