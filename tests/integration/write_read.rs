//! Integration test: writes and reads over TCP.
//!
//! Every request goes through the real storage protocol to a
//! `StoreServer`, so framing, handshake and pooling are all exercised.

use shardgate_integration_tests::{TcpCluster, test_data_seeded, test_pool_config};
use shardgate_router::{ReadOutcome, RouterError};
use shardgate_store::StoreError;
use shardgate_types::{Credentials, PartitionKey};

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_url_round_trip() {
    let cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    let url = "http://example.com";
    let receipt = router.write(url, url.as_bytes().to_vec()).await.unwrap();
    assert_eq!(receipt.partition_key, PartitionKey::derive(url, 5));

    let owner = cluster.index_of(&receipt.shard_id);
    for i in 0..cluster.len() {
        let expected = usize::from(i == owner);
        assert_eq!(cluster.record_count(i), expected, "node {i}");
    }

    match router.read(&receipt.partition_key).await.unwrap() {
        ReadOutcome::Found(record) => {
            assert_eq!(record.entity_key, url);
            assert_eq!(record.value, url.as_bytes());
        }
        ReadOutcome::NotFound => panic!("url should be stored"),
    }
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_keys_spread_over_all_shards() {
    let cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    let mut written = Vec::new();
    for i in 0..300u32 {
        let key = format!("https://example.com/page/{i}");
        let data = test_data_seeded(64 + i as usize, i + 1);
        let receipt = router.write(&key, data.clone()).await.unwrap();
        written.push((receipt.partition_key, key, data));
    }

    for i in 0..cluster.len() {
        assert!(
            cluster.record_count(i) > 30,
            "node {i} got only {} of 300 records",
            cluster.record_count(i)
        );
    }

    for (pk, key, data) in &written {
        match router.read(pk).await.unwrap() {
            ReadOutcome::Found(record) if record.entity_key == *key => {
                assert_eq!(&record.value, data, "value mismatch for {key}");
            }
            // Another key with the same 5-char partition key was stored first.
            ReadOutcome::Found(_) => {}
            ReadOutcome::NotFound => panic!("{key} missing"),
        }
    }
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_never_written_key_not_found() {
    let cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    let pk = router.partition_key_for("never-written");
    assert_eq!(router.read(&pk).await.unwrap(), ReadOutcome::NotFound);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_large_value_round_trip() {
    let cluster = TcpCluster::start(2).await;
    let router = cluster.router(test_pool_config());

    let data = test_data_seeded(1024 * 1024, 42);
    let receipt = router.write("big", data.clone()).await.unwrap();
    match router.read(&receipt.partition_key).await.unwrap() {
        ReadOutcome::Found(record) => assert_eq!(record.value, data),
        ReadOutcome::NotFound => panic!("record should exist"),
    }
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_credentials_checked_per_shard() {
    let credentials = Credentials {
        user: "postgres".into(),
        password: "postgres".into(),
        database: "postgres".into(),
    };
    let cluster = TcpCluster::start_with(3, Some(credentials)).await;

    // Endpoints from the cluster carry the right login.
    let router = cluster.router(test_pool_config());
    router.write("k", b"v".to_vec()).await.unwrap();

    // Same nodes without a login are refused at connect time.
    let anonymous: Vec<_> = cluster
        .endpoints()
        .into_iter()
        .map(|mut e| {
            e.credentials = Credentials::default();
            e
        })
        .collect();
    let router = shardgate_router::Router::build(
        Default::default(),
        anonymous,
        std::sync::Arc::new(shardgate_store::TcpConnector::new()),
        test_pool_config(),
    )
    .unwrap();

    let err = router.write("k", b"v".to_vec()).await.unwrap_err();
    match err {
        RouterError::ShardUnavailable { source, .. } => {
            assert!(matches!(source, StoreError::AuthRejected(_)), "got {source:?}");
        }
        other => panic!("expected ShardUnavailable, got {other:?}"),
    }
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_connections_reused_across_requests() {
    let cluster = TcpCluster::start(3).await;
    let router = cluster.router(test_pool_config());

    for i in 0..50 {
        router.write(&format!("k{i}"), b"v".to_vec()).await.unwrap();
    }

    // Sequential requests never need more than one connection per shard.
    for stats in router.pool().stats() {
        assert!(stats.idle <= 1, "{stats:?}");
        assert_eq!(stats.in_use, 0);
    }
}
