//! End-to-end routing through the interceptor

use std::collections::HashSet;
use std::time::Duration;

use athena_router::config::{Role, RoutingConfig};
use athena_router::pool::{ConnectionError, ConnectionPool};
use athena_router::router::{RouteError, RouteSource, RoutingContext, Statement};
use futures::FutureExt;

use crate::{cluster, cluster_with};

#[tokio::test]
async fn test_primary_and_replica_chain() {
    let c = cluster_with(
        &[("master1", Role::Primary), ("slave1", Role::Replica)],
        RoutingConfig {
            default_datasource: "master1".into(),
            ..RoutingConfig::default()
        },
    );
    c.manager.check_health_and_wait().await;

    RoutingContext::scope(async {
        let primary = c.manager.get_data_source(Role::Primary).unwrap();
        assert_eq!(primary, "master1");
        {
            let _pin = RoutingContext::pin(primary).unwrap();
            let used = c.run(Statement::new("INSERT INTO orders VALUES (1)")).await.unwrap();
            assert_eq!(used, "master1");
        }

        let replica = c.manager.get_data_source(Role::Replica).unwrap();
        assert_eq!(replica, "slave1");
        {
            let _pin = RoutingContext::pin(replica).unwrap();
            let used = c.run(Statement::new("SELECT * FROM orders")).await.unwrap();
            assert_eq!(used, "slave1");
        }

        assert_eq!(RoutingContext::current(), None);
    })
    .await;

    assert_eq!(c.pool("master1").executed(), vec!["INSERT INTO orders VALUES (1)"]);
    assert_eq!(c.pool("slave1").executed(), vec!["SELECT * FROM orders"]);
}

#[tokio::test]
async fn test_replica_reads_cover_all_replicas() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    let mut used = HashSet::new();
    for _ in 0..10 {
        used.insert(c.run(Statement::new("SELECT 1")).await.unwrap());
    }
    assert_eq!(used, HashSet::from(["slave1".to_string(), "slave2".to_string()]));
    assert!(c.pool("master1").executed().is_empty());
}

#[tokio::test]
async fn test_unknown_pin_fails_without_touching_pools() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    let err = RoutingContext::scope(async {
        let _pin = RoutingContext::pin("missing").unwrap();
        c.run(Statement::new("SELECT 1")).await.unwrap_err()
    })
    .await;
    assert_eq!(err, RouteError::NotRegistered("missing".into()));

    for name in ["master1", "slave1", "slave2"] {
        assert_eq!(c.pool(name).acquired_total(), 0);
    }
}

#[tokio::test]
async fn test_unregistered_replica_excluded() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    c.manager.unregister("slave2").await.unwrap();

    assert_eq!(c.manager.get_available_data_sources(Role::Replica), vec!["slave1"]);
    for _ in 0..6 {
        assert_eq!(c.run(Statement::new("SELECT 1")).await.unwrap(), "slave1");
    }
    assert!(!c.manager.get_health_status().contains_key("slave2"));
    assert!(c.pool("slave2").executed().is_empty());
}

#[tokio::test]
async fn test_in_flight_call_survives_unregister() {
    let c = cluster();
    c.manager.check_health_and_wait().await;
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (finish_tx, finish_rx) = tokio::sync::oneshot::channel::<()>();

    let interceptor = c.manager.interceptor().clone();
    let call = tokio::spawn(async move {
        let statement = Statement::new("SELECT * FROM slow");
        interceptor
            .execute(&statement, move |conn| {
                async move {
                    let _ = started_tx.send(conn.datasource().to_string());
                    let _ = finish_rx.await;
                    Ok::<_, RouteError>(conn.datasource().to_string())
                }
                .boxed()
            })
            .await
    });

    let routed_to = started_rx.await.unwrap();
    c.manager.unregister(&routed_to).await.unwrap();
    assert!(!c.manager.registry().contains(&routed_to));

    finish_tx.send(()).unwrap();
    assert_eq!(call.await.unwrap().unwrap(), routed_to);
    assert_eq!(c.pool(&routed_to).released_total(), 1);
    assert!(c.pool(&routed_to).is_closed());
}

#[tokio::test]
async fn test_pool_error_propagates() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    // Hold every master1 connection so the next acquire times out
    let pool = c.pool("master1");
    let mut held = Vec::new();
    for _ in 0..4 {
        held.push(pool.acquire().await.unwrap());
    }

    let err = c.run(Statement::new("UPDATE t SET a = 1")).await.unwrap_err();
    assert_eq!(err, RouteError::Connection(ConnectionError::Timeout(50)));

    drop(held);
    assert_eq!(c.run(Statement::new("UPDATE t SET a = 1")).await.unwrap(), "master1");
}

#[tokio::test]
async fn test_connection_released_when_call_fails() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    for _ in 0..10 {
        let result: Result<(), RouteError> = c
            .manager
            .interceptor()
            .execute(&Statement::write("INSERT INTO t VALUES (1)"), |conn| {
                async move {
                    conn.execute("INSERT INTO t VALUES (1)").await?;
                    Err(RouteError::Connection(ConnectionError::Database(
                        "duplicate key".into(),
                    )))
                }
                .boxed()
            })
            .await;
        assert!(result.is_err());
    }

    let master = c.pool("master1");
    assert_eq!(master.acquired_total(), 10);
    assert_eq!(master.released_total(), 10);
    assert_eq!(master.in_use(), 0);
}

#[tokio::test]
async fn test_transaction_reads_stay_on_primary() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    let route = c
        .manager
        .interceptor()
        .resolve(&Statement::new("SELECT * FROM t").with_transaction(true))
        .unwrap();
    assert_eq!(route.name(), "master1");
    assert_eq!(route.source, RouteSource::Balanced);
}

#[tokio::test(start_paused = true)]
async fn test_register_at_runtime_joins_rotation() {
    let c = cluster();
    c.manager.check_health_and_wait().await;

    c.manager
        .register(crate::datasource("slave3", Role::Replica))
        .await
        .unwrap();

    let mut used = HashSet::new();
    for _ in 0..9 {
        used.insert(c.run(Statement::new("SELECT 1")).await.unwrap());
    }
    assert!(used.contains("slave3"));

    // Let a background probe run to confirm the new pool is included
    let shutdown = tokio_util::sync::CancellationToken::new();
    let task = c.manager.start(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    task.await.unwrap();
    assert!(c.pool("slave3").pings_total() >= 2);
}
