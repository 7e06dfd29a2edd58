//! Integration test entry point
//!
//! Exercises the public API end to end against in-memory pools.
//!
//! Run with: cargo test --test integration

mod concurrency;
mod health;
mod routing;

use std::sync::Arc;

use athena_router::config::{Config, DataSourceConfig, HealthCheckConfig, PoolSizing, Role, RoutingConfig};
use athena_router::pool::{MemoryPool, MemoryPoolBuilder};
use athena_router::router::{RouteError, Statement};
use athena_router::DataSourceManager;
use futures::FutureExt;

/// Manager plus the builder that kept a handle to every pool
pub struct TestCluster {
    pub manager: DataSourceManager,
    pub builder: Arc<MemoryPoolBuilder>,
}

impl TestCluster {
    pub fn pool(&self, name: &str) -> Arc<MemoryPool> {
        self.builder.pool(name).expect("pool was built")
    }

    /// Route `sql` and return the datasource that executed it
    pub async fn run(&self, statement: Statement) -> Result<String, RouteError> {
        let sql = statement.sql.clone();
        self.manager
            .interceptor()
            .execute(&statement, move |conn| {
                async move {
                    conn.execute(&sql).await?;
                    Ok::<_, RouteError>(conn.datasource().to_string())
                }
                .boxed()
            })
            .await
    }
}

/// Datasource config with a small, fast-failing pool
pub fn datasource(name: &str, role: Role) -> DataSourceConfig {
    let mut ds = DataSourceConfig::new(name, role, format!("mem://{}", name));
    ds.pool = PoolSizing {
        min_idle: 0,
        max_size: 4,
        acquire_timeout_ms: 50,
    };
    ds
}

pub fn config_with(datasources: &[(&str, Role)], routing: RoutingConfig) -> Config {
    Config {
        routing,
        datasources: datasources
            .iter()
            .map(|(name, role)| datasource(name, *role))
            .collect(),
        health: HealthCheckConfig {
            check_interval_ms: 20,
            check_timeout_ms: 50,
            ..HealthCheckConfig::default()
        },
    }
}

pub fn cluster_with(datasources: &[(&str, Role)], routing: RoutingConfig) -> TestCluster {
    let builder = Arc::new(MemoryPoolBuilder::new());
    let manager = DataSourceManager::new(&config_with(datasources, routing), builder.clone())
        .expect("valid config");
    TestCluster { manager, builder }
}

/// master1 + slave1 + slave2, default routing
pub fn cluster() -> TestCluster {
    cluster_with(
        &[
            ("master1", Role::Primary),
            ("slave1", Role::Replica),
            ("slave2", Role::Replica),
        ],
        RoutingConfig {
            default_datasource: "master1".into(),
            ..RoutingConfig::default()
        },
    )
}
