//! Concurrent call chains must never observe each other's pins

use std::sync::Arc;

use athena_router::config::Role;
use athena_router::router::{RoutingContext, Statement};

use crate::cluster;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_chains_keep_their_own_pins() {
    let c = Arc::new(cluster());
    c.manager.check_health_and_wait().await;

    let mut handles = Vec::new();
    for chain in 0..6 {
        let c = c.clone();
        handles.push(tokio::spawn(RoutingContext::scope(async move {
            for round in 0..20 {
                let primary = c.manager.get_data_source(Role::Primary).unwrap();
                {
                    let _pin = RoutingContext::pin(primary.clone()).unwrap();
                    tokio::task::yield_now().await;
                    let used = c
                        .run(Statement::new(format!("INSERT INTO t VALUES ({}, {})", chain, round)))
                        .await
                        .unwrap();
                    assert_eq!(used, primary);
                    assert_eq!(RoutingContext::current().as_deref(), Some(primary.as_str()));
                }
                assert_eq!(RoutingContext::current(), None);

                let replica = c.manager.get_data_source(Role::Replica).unwrap();
                {
                    let _pin = RoutingContext::pin(replica.clone()).unwrap();
                    tokio::task::yield_now().await;
                    let used = c
                        .run(Statement::new(format!("SELECT * FROM t WHERE c = {}", chain)))
                        .await
                        .unwrap();
                    assert_eq!(used, replica);
                    assert_eq!(RoutingContext::current().as_deref(), Some(replica.as_str()));
                }
                assert_eq!(RoutingContext::current(), None);
            }
        })));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(c.pool("master1").executed().len(), 6 * 20);
    let replica_calls = c.pool("slave1").executed().len() + c.pool("slave2").executed().len();
    assert_eq!(replica_calls, 6 * 20);
    assert!(c.pool("master1").executed().iter().all(|sql| sql.starts_with("INSERT")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pinned_chain_does_not_leak_into_unpinned_chain() {
    let c = Arc::new(cluster());
    c.manager.check_health_and_wait().await;

    let pinned = {
        let c = c.clone();
        tokio::spawn(RoutingContext::scope(async move {
            let _pin = RoutingContext::pin("master1").unwrap();
            for _ in 0..50 {
                assert_eq!(c.run(Statement::new("SELECT 1")).await.unwrap(), "master1");
                tokio::task::yield_now().await;
            }
        }))
    };
    let unpinned = {
        let c = c.clone();
        tokio::spawn(RoutingContext::scope(async move {
            for _ in 0..50 {
                assert_ne!(c.run(Statement::new("SELECT 1")).await.unwrap(), "master1");
                tokio::task::yield_now().await;
            }
        }))
    };

    pinned.await.unwrap();
    unpinned.await.unwrap();
}
