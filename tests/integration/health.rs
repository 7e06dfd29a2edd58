//! Health probing as seen through the manager

use std::time::Duration;

use athena_router::config::{Role, RoutingConfig};
use athena_router::health::HealthStatus;
use athena_router::router::{RouteError, RouteSource, Statement};
use tokio_util::sync::CancellationToken;

use crate::{cluster, cluster_with};

#[tokio::test]
async fn test_status_before_first_probe() {
    let c = cluster();

    let status = c.manager.get_health_status();
    assert_eq!(status.len(), 3);
    assert!(status.values().all(|healthy| !healthy));
    assert!(matches!(
        c.run(Statement::new("SELECT 1")).await,
        Err(RouteError::NoHealthyCandidate(Role::Replica))
    ));
}

#[tokio::test]
async fn test_unreachable_replica_reported_and_skipped() {
    let c = cluster();
    c.pool("slave2").set_reachable(false);
    c.manager.check_health_and_wait().await;

    let status = c.manager.get_health_status();
    assert!(status["master1"]);
    assert!(status["slave1"]);
    assert!(!status["slave2"]);

    for _ in 0..5 {
        assert_eq!(c.run(Statement::new("SELECT 1")).await.unwrap(), "slave1");
    }
    let state = c.manager.prober().state("slave2").unwrap();
    assert_eq!(state.status, HealthStatus::Unhealthy);
    assert!(state.last_error.is_some());
}

#[tokio::test]
async fn test_all_replicas_down_fails_fast() {
    let c = cluster();
    c.pool("slave1").set_reachable(false);
    c.pool("slave2").set_reachable(false);
    c.manager.check_health_and_wait().await;

    let err = c.run(Statement::new("SELECT 1")).await.unwrap_err();
    assert_eq!(err, RouteError::NoHealthyCandidate(Role::Replica));
    assert_eq!(c.pool("master1").acquired_total(), 0);

    // Writes are unaffected
    assert_eq!(c.run(Statement::new("DELETE FROM t")).await.unwrap(), "master1");
}

#[tokio::test]
async fn test_replica_fallback_is_opt_in() {
    let c = cluster_with(
        &[("master1", Role::Primary), ("slave1", Role::Replica)],
        RoutingConfig {
            default_datasource: "master1".into(),
            replica_fallback_to_primary: true,
            ..RoutingConfig::default()
        },
    );
    c.pool("slave1").set_reachable(false);
    c.manager.check_health_and_wait().await;

    let route = c
        .manager
        .interceptor()
        .resolve(&Statement::new("SELECT 1"))
        .unwrap();
    assert_eq!(route.name(), "master1");
    assert_eq!(route.source, RouteSource::ReplicaFallback);
}

#[tokio::test(start_paused = true)]
async fn test_background_prober_tracks_outage_and_recovery() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    let shutdown = CancellationToken::new();
    let task = c.manager.start(shutdown.clone());

    c.pool("slave1").set_reachable(false);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(c.manager.get_available_data_sources(Role::Replica), vec!["slave2"]);

    c.pool("slave1").set_reachable(true);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        c.manager.get_available_data_sources(Role::Replica),
        vec!["slave1", "slave2"]
    );

    shutdown.cancel();
    task.await.unwrap();

    let stats = c.manager.prober().stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.healthy, 3);
}
