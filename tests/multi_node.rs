//! Several nodes sharing one registry through the public API

use liveness_registry::{
    now_ms, LivenessConfig, MemoryStore, NodeId, NodeRegistry, ShardedStore, SharedStore,
    SharedStoreRef, Sweeper, SweeperConfig,
};
use std::sync::Arc;

const TTL_SECS: u64 = 5;

fn config() -> LivenessConfig {
    LivenessConfig::with_ttl_secs(TTL_SECS)
}

async fn join(store: &MemoryStore, key: &str) -> Arc<NodeRegistry> {
    NodeRegistry::new(Arc::new(store.clone()), key, config())
        .await
        .unwrap()
}

#[tokio::test]
async fn every_participant_sees_the_others() {
    let backing = MemoryStore::new("node-a");
    let a = join(&backing, "orders").await;
    let b = join(&backing.handle("node-b"), "orders").await;
    let c = join(&backing.handle("node-c"), "orders").await;

    for registry in [&a, &b, &c] {
        let nodes = registry.get_all_nodes().await.unwrap();
        assert_eq!(nodes.len(), 3);
        for ts in nodes.values() {
            assert!(now_ms() - ts < 5_000);
        }
    }
}

#[tokio::test]
async fn registries_for_different_keys_are_independent() {
    let backing = MemoryStore::new("node-a");
    let orders = join(&backing, "orders").await;
    let users = join(&backing.handle("node-b"), "users").await;

    assert_eq!(orders.get_all_nodes().await.unwrap().len(), 1);
    assert_eq!(users.get_all_nodes().await.unwrap().len(), 1);

    orders.clear_nodelist().await.unwrap();
    assert_eq!(users.count().await.unwrap(), 1);
}

#[tokio::test]
async fn crashed_peer_is_swept_and_survivor_detects_it() {
    let backing = MemoryStore::new("node-a");
    let a = join(&backing, "lock:report").await;
    let _b = join(&backing.handle("node-b"), "lock:report").await;

    assert!(!a.is_sole_survivor().await.unwrap());

    // node-b stops heartbeating; backdate its last heartbeat past 2 * TTL
    let stale = now_ms() - (2 * TTL_SECS as i64 + 1) * 1000;
    backing
        .hset(a.registry_key(), "node-b", &stale.to_string())
        .await
        .unwrap();

    assert!(a.is_sole_survivor().await.unwrap());
    assert_eq!(a.get_last_updated("node-b").await.unwrap(), None);
}

#[tokio::test]
async fn late_heartbeat_beats_stale_candidate_set() {
    let backing = MemoryStore::new("sweeper");
    let sweeper = join(&backing, "key").await;
    let late = join(&backing.handle("late"), "key").await;

    let stale = now_ms() - (2 * TTL_SECS as i64 + 1) * 1000;
    for id in ["late", "gone"] {
        backing
            .hset(sweeper.registry_key(), id, &stale.to_string())
            .await
            .unwrap();
    }

    let candidates = sweeper.find_expired_nodes().await.unwrap();
    assert_eq!(candidates.len(), 2);

    late.refresh_session().await.unwrap();
    let removed = sweeper.remove_expired_nodes(Some(candidates)).await.unwrap();

    assert_eq!(removed.into_iter().collect::<Vec<_>>(), vec![NodeId::new("gone")]);
    assert!(sweeper.get_last_updated("late").await.unwrap().is_some());
}

#[tokio::test]
async fn sharded_store_keeps_registry_on_one_shard() {
    let shards: Vec<MemoryStore> = (0..3).map(|_| MemoryStore::new("node-a")).collect();
    let store: SharedStoreRef = Arc::new(
        ShardedStore::new(
            NodeId::new("node-a"),
            shards
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("cache-{i}"), Arc::new(s.clone()) as SharedStoreRef))
                .collect(),
        )
        .unwrap(),
    );

    let registry = NodeRegistry::new(store, "orders", config()).await.unwrap();
    registry.refresh_session_for("node-b").await.unwrap();
    registry.refresh_session_for("node-c").await.unwrap();

    let populated: Vec<usize> = shards.iter().map(|s| s.key_count()).collect();
    assert_eq!(populated.iter().sum::<usize>(), 1);
    assert_eq!(registry.get_all_nodes().await.unwrap().len(), 3);
}

#[tokio::test]
async fn sweepers_on_two_nodes_agree() {
    let backing = MemoryStore::new("node-a");
    let sweeper_a = Sweeper::new(SweeperConfig::default());
    let sweeper_b = Sweeper::new(SweeperConfig::default());
    let a = join(&backing, "key").await;
    sweeper_a.track(a.clone());
    sweeper_b.track(join(&backing.handle("node-b"), "key").await);

    let stale = now_ms() - (2 * TTL_SECS as i64 + 1) * 1000;
    backing
        .hset(a.registry_key(), "node-dead", &stale.to_string())
        .await
        .unwrap();

    let (report_a, report_b) = tokio::join!(sweeper_a.tick(), sweeper_b.tick());
    assert_eq!(report_a.expired_count() + report_b.expired_count(), 1);
    assert_eq!(report_a.failures + report_b.failures, 0);

    let nodes = a.get_all_nodes().await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(!nodes.contains_key("node-dead"));
}
