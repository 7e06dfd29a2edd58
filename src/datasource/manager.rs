//! Datasource manager implementation

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, DataSourceConfig, Role};
use crate::health::HealthProber;
use crate::pool::{ConnectionError, PoolBuilder};
use crate::registry::{Descriptor, Registry};
use crate::router::{Interceptor, LoadBalancer, RouteError};

/// Errors raised while building a [`DataSourceManager`]
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build pool for datasource {name}: {source}")]
    Pool {
        name: String,
        #[source]
        source: ConnectionError,
    },

    #[error(transparent)]
    Registry(#[from] RouteError),
}

/// Owns every routing component for one set of datasources
///
/// Provides:
/// - Runtime registration and removal of datasources
/// - Health snapshots and background probing
/// - Role-based selection and per-call routing through the [`Interceptor`]
pub struct DataSourceManager {
    registry: Arc<Registry>,
    prober: Arc<HealthProber>,
    balancer: Arc<LoadBalancer>,
    interceptor: Arc<Interceptor>,
    builder: Arc<dyn PoolBuilder>,
}

impl DataSourceManager {
    /// Build the manager and register every configured datasource.
    ///
    /// No probe runs here; call [`check_health_and_wait`](Self::check_health_and_wait)
    /// before routing, otherwise every datasource is still unknown.
    pub fn new(config: &Config, builder: Arc<dyn PoolBuilder>) -> Result<Self, StartupError> {
        config.validate()?;

        let registry = Arc::new(Registry::new(config.routing.default_datasource.clone()));
        for ds in &config.datasources {
            let pool = builder.build(ds).map_err(|source| StartupError::Pool {
                name: ds.name.clone(),
                source,
            })?;
            registry.register(Descriptor::new(ds.clone(), pool))?;
            debug!(datasource = %ds.name, role = %ds.role, url = %ds.url, "Registered datasource");
        }

        let prober = Arc::new(HealthProber::new(registry.clone(), config.health.clone()));
        let balancer = Arc::new(LoadBalancer::new(registry.clone(), prober.clone()));
        let interceptor = Arc::new(Interceptor::new(
            registry.clone(),
            balancer.clone(),
            config.routing.clone(),
        ));

        info!(
            datasources = registry.len(),
            primaries = registry.list(Role::Primary).len(),
            replicas = registry.list(Role::Replica).len(),
            "Datasource manager ready"
        );

        Ok(Self {
            registry,
            prober,
            balancer,
            interceptor,
            builder,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn prober(&self) -> &Arc<HealthProber> {
        &self.prober
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    /// Probe every datasource once and wait for the results
    pub async fn check_health_and_wait(&self) {
        self.prober.check_health_and_wait().await;
    }

    /// Start periodic health checks until `shutdown` is cancelled
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.prober.clone().start(shutdown)
    }

    /// Build a pool for `config` and add it to the live set.
    ///
    /// The new datasource is probed once before returning, so it becomes a
    /// routing candidate immediately if it is reachable.
    pub async fn register(&self, config: DataSourceConfig) -> Result<Arc<Descriptor>, StartupError> {
        if self.registry.contains(&config.name) {
            return Err(RouteError::DuplicateName(config.name).into());
        }
        let pool = self.builder.build(&config).map_err(|source| StartupError::Pool {
            name: config.name.clone(),
            source,
        })?;
        let descriptor = match self.registry.register(Descriptor::new(config, pool.clone())) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                // Lost a race with a concurrent register of the same name
                pool.close().await;
                return Err(e.into());
            }
        };

        let healthy = self.prober.probe_once(&descriptor).await;
        info!(
            datasource = %descriptor.name(),
            role = %descriptor.role(),
            healthy = healthy,
            "Datasource registered"
        );
        Ok(descriptor)
    }

    /// Remove `name` from the live set and close its pool.
    ///
    /// Calls already routed to it keep their connection until they finish.
    pub async fn unregister(&self, name: &str) -> Result<Arc<Descriptor>, RouteError> {
        let descriptor = self.registry.unregister(name)?;
        self.prober.forget(name);
        descriptor.pool().close().await;
        info!(datasource = %name, "Datasource unregistered");
        Ok(descriptor)
    }

    /// Health of every registered datasource, by name
    pub fn get_health_status(&self) -> HashMap<String, bool> {
        self.prober.get_health_status()
    }

    /// Next healthy datasource name for `role`
    pub fn get_data_source(&self, role: Role) -> Result<String, RouteError> {
        self.balancer.get_data_source(role)
    }

    /// Healthy datasource names for `role`
    pub fn get_available_data_sources(&self, role: Role) -> Vec<String> {
        self.balancer.get_available_data_sources(role)
    }

    /// Close every pool
    pub async fn shutdown(&self) {
        for descriptor in self.registry.list_all() {
            descriptor.pool().close().await;
        }
        let stats = self.prober.stats();
        if stats.unhealthy > 0 {
            warn!(unhealthy = stats.unhealthy, "Shut down with unhealthy datasources");
        }
        info!("Datasource manager stopped");
    }
}
