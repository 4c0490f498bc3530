//! Integration test: membership changes.
//!
//! Start with a small set of shards, add or remove one, and check that only
//! the expected fraction of keys changes owner. Records are not migrated:
//! keys that moved read as not found until their data is copied.

use shardgate_integration_tests::{TcpCluster, test_pool_config};
use shardgate_ring::Ring;
use shardgate_router::ReadOutcome;

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_add_shard_moves_about_one_nth() {
    let mut cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    let keys: Vec<String> = (0..400).map(|i| format!("obj-{i:03}")).collect();
    let mut receipts = Vec::new();
    for key in &keys {
        receipts.push(router.write(key, key.clone().into_bytes()).await.unwrap());
    }
    let before = router.ring().snapshot();

    let endpoint = cluster.add_node().await;
    router.add_shard(endpoint.clone()).unwrap();
    let after = router.ring().snapshot();
    assert_eq!(after.shard_count(), 4);

    let pks: Vec<String> = receipts
        .iter()
        .map(|r| r.partition_key.to_string())
        .collect();
    let moved = Ring::diff(&before, &after, &pks);

    // Everything that moved went to the new shard.
    assert!(moved.iter().all(|m| m.to == endpoint.id));
    // Expect ~1/4; allow wide slack for hashing variance.
    let fraction = moved.len() as f64 / pks.len() as f64;
    assert!(
        (0.10..=0.45).contains(&fraction),
        "{} of {} keys moved",
        moved.len(),
        pks.len()
    );

    // Unmoved keys still read from their old shard; moved keys miss.
    for receipt in &receipts {
        if moved.iter().any(|m| m.key == receipt.partition_key.as_str()) {
            assert_eq!(
                router.read(&receipt.partition_key).await.unwrap(),
                ReadOutcome::NotFound
            );
        } else {
            assert!(matches!(
                router.read(&receipt.partition_key).await.unwrap(),
                ReadOutcome::Found(_)
            ));
        }
    }

    // New writes for moved keys land on the new node.
    let new_idx = cluster.index_of(&endpoint.id);
    for m in moved.iter().take(5) {
        let idx = receipts
            .iter()
            .position(|r| r.partition_key.as_str() == m.key)
            .unwrap();
        let rewritten = router.write(&keys[idx], b"moved".to_vec()).await.unwrap();
        assert_eq!(rewritten.shard_id, endpoint.id);
    }
    assert!(cluster.record_count(new_idx) > 0);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_remove_shard_only_moves_its_keys() {
    let cluster = TcpCluster::start(4).await;
    let router = cluster.router(test_pool_config());

    let pks: Vec<String> = (0..400)
        .map(|i| router.partition_key_for(&format!("obj-{i}")).to_string())
        .collect();
    let before = router.ring().snapshot();

    let removed = cluster.shard_id(3);
    router.remove_shard(&removed).unwrap();
    let after = router.ring().snapshot();

    for m in Ring::diff(&before, &after, &pks) {
        assert_eq!(m.from, removed, "{} moved off a surviving shard", m.key);
    }
    assert!(!router.pool().shard_ids().contains(&removed));

    // Requests keep working on the three survivors.
    for i in 0..30 {
        let receipt = router.write(&format!("after-{i}"), b"v".to_vec()).await.unwrap();
        assert_ne!(receipt.shard_id, removed);
    }
}
