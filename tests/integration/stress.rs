//! Integration test: many concurrent requests over TCP.

use std::sync::Arc;
use std::time::Duration;

use shardgate_integration_tests::{TcpCluster, test_data_seeded, test_pool_config};
use shardgate_router::ReadOutcome;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_concurrent_writes_and_reads() {
    let cluster = TcpCluster::start(3).await;
    let mut pool_config = test_pool_config();
    pool_config.max_connections_per_shard = 4;
    pool_config.acquire_timeout = Duration::from_secs(10);
    let router = Arc::new(cluster.router(pool_config));

    let mut handles = Vec::new();
    for i in 0..200u32 {
        let r = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            let key = format!("stress-{i}");
            let data = test_data_seeded(128, i + 1);
            let receipt = r.write(&key, data.clone()).await.unwrap();
            match r.read(&receipt.partition_key).await.unwrap() {
                ReadOutcome::Found(record) if record.entity_key == key => {
                    assert_eq!(record.value, data);
                }
                ReadOutcome::Found(_) => {}
                ReadOutcome::NotFound => panic!("{key} missing right after write"),
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let total: usize = (0..cluster.len()).map(|i| cluster.record_count(i)).sum();
    assert_eq!(total, 200);

    // The pool never opened more than its bound per shard.
    for stats in router.pool().stats() {
        assert!(stats.idle <= 4, "{stats:?}");
        assert_eq!(stats.in_use, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_concurrent_requests_with_single_connection_per_shard() {
    let cluster = TcpCluster::start(3).await;
    let mut pool_config = test_pool_config();
    pool_config.max_connections_per_shard = 1;
    pool_config.acquire_timeout = Duration::from_secs(20);
    let router = Arc::new(cluster.router(pool_config));

    let mut handles = Vec::new();
    for i in 0..60u32 {
        let r = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            r.write(&format!("serial-{i}"), b"v".to_vec()).await.unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    for stats in router.pool().stats() {
        assert!(stats.idle <= 1, "{stats:?}");
    }
}
