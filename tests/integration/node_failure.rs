//! Integration test: storage node failures.
//!
//! A dead shard fails its own keys and only its own keys; there is no
//! fallback to another shard.

use shardgate_integration_tests::{TcpCluster, test_pool_config};
use shardgate_router::{ReadOutcome, Router, RouterError};
use shardgate_types::ShardId;

/// First `key-{i}` owned by `target`.
fn key_owned_by(router: &Router, target: &ShardId) -> String {
    (0..10_000)
        .map(|i| format!("key-{i}"))
        .find(|k| router.resolve(&router.partition_key_for(k)).unwrap() == *target)
        .unwrap()
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_dead_shard_fails_only_its_keys() {
    let mut cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    let dead = cluster.shard_id(1);
    let dead_key = key_owned_by(&router, &dead);
    let live_key = key_owned_by(&router, &cluster.shard_id(0));

    cluster.kill_node(1).await;

    let err = router.write(&dead_key, b"v".to_vec()).await.unwrap_err();
    assert!(
        matches!(err, RouterError::ShardUnavailable { .. }),
        "got {err:?}"
    );
    assert_eq!(err.shard_id(), Some(&dead));

    // Nothing landed anywhere else.
    assert_eq!(cluster.record_count(0) + cluster.record_count(2), 0);

    router.write(&live_key, b"v".to_vec()).await.unwrap();
    assert_eq!(cluster.record_count(0), 1);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_pooled_connection_to_killed_node_is_dropped() {
    let mut cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    let target = cluster.shard_id(2);
    let key = key_owned_by(&router, &target);
    let receipt = router.write(&key, b"v".to_vec()).await.unwrap();
    assert_eq!(receipt.shard_id, target);

    cluster.kill_node(2).await;

    // The idle connection is dead; the request fails on it and it is
    // discarded rather than pooled again.
    let err = router.read(&receipt.partition_key).await.unwrap_err();
    assert!(
        matches!(
            err,
            RouterError::StorageRead { .. } | RouterError::ShardUnavailable { .. }
        ),
        "got {err:?}"
    );
    let stats = router.pool().stats();
    let target_stats = stats.iter().find(|s| s.shard_id == target).unwrap();
    assert_eq!(target_stats.idle, 0);
    assert_eq!(target_stats.in_use, 0);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_revived_node_serves_its_records_again() {
    let mut cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    let target = cluster.shard_id(0);
    let key = key_owned_by(&router, &target);
    let receipt = router.write(&key, b"survives".to_vec()).await.unwrap();

    cluster.kill_node(0).await;
    assert!(router.read(&receipt.partition_key).await.is_err());
    // The stale connection may take one failed request to flush out.
    let _ = router.read(&receipt.partition_key).await;

    cluster.revive_node(0).await;
    match router.read(&receipt.partition_key).await.unwrap() {
        ReadOutcome::Found(record) => assert_eq!(record.value, b"survives"),
        ReadOutcome::NotFound => panic!("record should survive a restart"),
    }
}
